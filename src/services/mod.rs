pub mod notify;
pub mod weather_api;
