pub mod options;
pub mod output;
pub mod run;
pub mod settings;
