//! Unit tests for jobs, queues and their consumers.
