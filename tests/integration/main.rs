mod common;
mod events_test;
mod health_test;
