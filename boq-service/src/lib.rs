//! boq-service: PO / BOQ spreadsheet ingestion and invoice billing reconciliation.

pub mod billing;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod models;
pub mod repository;
pub mod services;
pub mod startup;
