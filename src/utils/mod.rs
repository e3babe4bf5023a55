pub mod dates;
pub mod text;
pub mod threads;
pub mod token_estimator;
pub mod urls;
