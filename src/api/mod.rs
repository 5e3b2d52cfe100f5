// api/mod.rs - ambient observability surface
//
// The library is consumed primarily as an in-process `Facade`; this module
// adds a thin read-only HTTP veneer over it for operators who want to poll
// job state without embedding the crate. No job submission is exposed over
// HTTP: submission stays a library call from the host application.

pub mod http;
