pub mod utils;

mod history_tests;
