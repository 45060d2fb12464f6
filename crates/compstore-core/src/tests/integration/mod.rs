#![cfg(test)]

pub mod application_tests;
pub mod project_tests;
