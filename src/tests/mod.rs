//! Scenario suites spanning several modules

mod assembler_tests;
mod evm_tests;
