mod common;
mod parsing_tests;
mod pipeline_tests;
