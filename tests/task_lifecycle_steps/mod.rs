//! Step definitions for task lifecycle scenarios.

mod given;
