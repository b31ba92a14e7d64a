mod dispatch_test;
mod runner_test;
