pub mod auth;
pub mod cron;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod presence;
pub mod routes;
