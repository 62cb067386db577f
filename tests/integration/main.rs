//! Integration tests

mod bus_test;
mod feed_test;
mod pipeline_test;
mod support;
