pub mod eval;
pub mod guests;
pub mod run;
pub mod session;
