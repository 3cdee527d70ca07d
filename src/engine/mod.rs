//! The control-plane coordinator: owns every collaborator module and the
//! long-lived tasks that drive them (spec.md §5 — scheduler tick, dispatch
//! pool, ingress drain), and exposes the publish/offer/pause/resume/cancel/
//! progress/subscribe surface named in spec.md §6.

pub mod coordinator;

pub use coordinator::{Engine, PeerSelector};
