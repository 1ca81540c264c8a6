#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so existing imports like
//! `use crate::db::models::*;` continue to work.

pub mod domain_event;
pub mod notification;
pub mod notification_template;
pub mod status_event;
pub mod user_preference;
pub mod work_item;

pub use self::domain_event::*;
pub use self::notification::*;
pub use self::notification_template::*;
pub use self::status_event::*;
pub use self::user_preference::*;
pub use self::work_item::*;
