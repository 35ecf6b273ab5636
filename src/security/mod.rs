//! 入力の安全性に関するモジュール
//!
//! 信頼できない入力のサニタイズ・検証と、クライアントごとの
//! アドミッション制御（レート制限）を提供する。

pub mod rate_limit;
pub mod validator;

pub use rate_limit::{RateClass, RateLimiter};
