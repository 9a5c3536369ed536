// Integration tests

mod common;
mod ledger_test;
mod race_condition_test;
mod router_test;
