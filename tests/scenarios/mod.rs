//! Pipeline scenarios run against a recording command runner

mod dry_run;
mod failure_handling;
mod matrix_build;
mod secrets;
mod tag_gated_deploy;
mod variable_substitution;
