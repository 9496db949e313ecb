//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: the terminal UI drives the services
//! - Outbound: services reach storage, the code log and the clock

pub mod inbound;
pub mod outbound;

pub use inbound::InputPort;
pub use outbound::{AccountPort, BillingPort, Clock, LessonPort, PhoneCodeLogPort, RosterPort};
