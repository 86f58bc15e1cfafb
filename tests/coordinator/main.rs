#![allow(
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

mod best_trial;
mod builder;
mod create_trial;
mod driver;
mod flaky;
mod suggest;
