pub mod auth;
pub mod bank;
pub mod blood;
pub mod config;
pub mod db;
pub mod donation;
pub mod donor;
pub mod eligibility;
pub mod environment;
pub mod errors;
pub mod mail;
pub mod normalization;
pub mod routes;
pub mod staff;
pub mod timestamp;
pub mod urls;
pub mod validation;
pub mod withdrawal;
