//! Shared test scaffolding: spins up a real gateway bound to an ephemeral
//! port and drives it with a WebSocket client, mirroring the teacher's
//! `tests/common` + `tests/tests` split.

pub mod gateway;
