// Cost models: closed-form impact, online predictors, and their composition
pub mod impact;
pub mod predictor;
pub mod regression;
pub mod slippage;
pub mod maker_taker;
pub mod cost;
