//! tutor-crm: tutoring-center CRM (students, courses, attendance, lesson balances) with Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;

#[cfg(test)]
pub(crate) mod test_support;
