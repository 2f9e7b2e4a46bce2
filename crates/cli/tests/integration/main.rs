mod build_tests;
mod common;
mod develop_tests;
mod gc_tests;
mod show_tests;
