//! Flutter bridge for the TV remote dashboard

pub mod api;
pub mod bridge;
