pub mod fetch;
pub mod load;
pub mod run;
pub mod stage;
pub mod tables;
