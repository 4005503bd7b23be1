pub mod assignments;
pub mod backup_exchange;
pub mod core;
pub mod courses;
pub mod enrollment;
pub mod feedback;
pub mod grades;
pub mod rooms;
pub mod users;
