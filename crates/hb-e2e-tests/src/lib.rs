//! End-to-end tests for the HiLink bridge live under `tests/`.
