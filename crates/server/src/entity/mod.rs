pub mod deployed_datetime;
pub mod email_log;
pub mod router;
pub mod subscriber;
pub mod subscription;
