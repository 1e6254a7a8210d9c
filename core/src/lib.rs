pub mod auth;
pub mod drive;
pub mod error;
pub mod matching;
pub mod report;
pub mod site;
