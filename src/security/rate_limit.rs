//! スライディングウィンドウ方式のレート制限
//!
//! (識別子, 操作クラス) ごとにウィンドウ内のリクエスト数を数え、
//! 上限を超えたアドミッションを拒否する。ウィンドウ状態はプロセス全体で
//! 共有される唯一の可変状態であり、単一の Mutex で保護する。
//! 未定義のクラスは常に許可する（fail-open）。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

/// 操作クラスごとの制限設定
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateClass {
    pub max_requests: u32,
    pub window_seconds: u64,
}

/// ウィンドウ内の 1 エントリ（時刻とカウント）
type WindowEntry = (Instant, u32);

/// スライディングウィンドウ・レートリミッタ
///
/// チェックのたびにウィンドウ外へ出た古いエントリをパージするため、
/// 明示的な後始末は不要（エントリは自然に減衰する）。
pub struct RateLimiter {
    classes: HashMap<String, RateClass>,
    windows: Mutex<HashMap<(String, String), Vec<WindowEntry>>>,
}

impl RateLimiter {
    /// クラステーブルを指定してリミッタを生成する。
    pub fn new(classes: HashMap<String, RateClass>) -> Self {
        Self {
            classes,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 指定クラスの設定を返す。
    pub fn class(&self, class: &str) -> Option<RateClass> {
        self.classes.get(class).copied()
    }

    /// リクエストを許可するかを判定する。
    ///
    /// パージ → 合計 → 上限比較 → 記録、を同一ロック内で行う。
    /// 並行リクエストが同じ古いカウントを読んで二重に許可されることはない。
    pub fn is_allowed(&self, identifier: &str, class: &str) -> bool {
        self.is_allowed_at(identifier, class, Instant::now())
    }

    /// 指定クラスの残りリクエスト数を返す。未定義クラスは `u32::MAX`。
    pub fn remaining(&self, identifier: &str, class: &str) -> u32 {
        self.remaining_at(identifier, class, Instant::now())
    }

    /// 時刻注入版の許可判定（テストからも使用）
    fn is_allowed_at(&self, identifier: &str, class: &str, now: Instant) -> bool {
        let limit = match self.classes.get(class) {
            Some(limit) => *limit,
            None => {
                // 未定義クラスは fail-open。新しい操作種別をブロックしないための既定。
                debug!(class = %class, "Unknown rate limit class, allowing (fail-open)");
                return true;
            }
        };

        let key = (identifier.to_string(), class.to_string());
        let window = Duration::from_secs(limit.window_seconds);

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Rate limiter lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let entries = windows.entry(key).or_default();
        entries.retain(|(ts, _)| now.duration_since(*ts) < window);

        let current: u32 = entries.iter().map(|(_, count)| count).sum();
        if current >= limit.max_requests {
            debug!(
                identifier = %identifier,
                class = %class,
                current = current,
                max = limit.max_requests,
                "Rate limit exceeded"
            );
            return false;
        }

        entries.push((now, 1));
        true
    }

    /// 時刻注入版の残数取得（テストからも使用）
    fn remaining_at(&self, identifier: &str, class: &str, now: Instant) -> u32 {
        let limit = match self.classes.get(class) {
            Some(limit) => *limit,
            None => return u32::MAX,
        };

        let key = (identifier.to_string(), class.to_string());
        let window = Duration::from_secs(limit.window_seconds);

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entries = windows.entry(key).or_default();
        entries.retain(|(ts, _)| now.duration_since(*ts) < window);

        let current: u32 = entries.iter().map(|(_, count)| count).sum();
        limit.max_requests.saturating_sub(current)
    }
}

/// 既定のクラステーブル。
/// コマンド実行は狭め、汎用 API は緩め、ファイル検索は中間。
pub fn default_classes() -> HashMap<String, RateClass> {
    let mut classes = HashMap::new();
    classes.insert(
        "command".to_string(),
        RateClass {
            max_requests: 60,
            window_seconds: 60,
        },
    );
    classes.insert(
        "api_request".to_string(),
        RateClass {
            max_requests: 1000,
            window_seconds: 3600,
        },
    );
    classes.insert(
        "file_search".to_string(),
        RateClass {
            max_requests: 20,
            window_seconds: 60,
        },
    );
    classes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_seconds: u64) -> RateLimiter {
        let mut classes = HashMap::new();
        classes.insert(
            "test".to_string(),
            RateClass {
                max_requests,
                window_seconds,
            },
        );
        RateLimiter::new(classes)
    }

    #[test]
    fn admits_exactly_n_within_window() {
        let limiter = limiter(3, 60);
        let now = Instant::now();

        assert!(limiter.is_allowed_at("alice", "test", now));
        assert!(limiter.is_allowed_at("alice", "test", now));
        assert!(limiter.is_allowed_at("alice", "test", now));
        // N+1 件目は拒否される
        assert!(!limiter.is_allowed_at("alice", "test", now));
    }

    #[test]
    fn admits_again_after_window_elapses() {
        let limiter = limiter(2, 60);
        let start = Instant::now();

        assert!(limiter.is_allowed_at("alice", "test", start));
        assert!(limiter.is_allowed_at("alice", "test", start));
        assert!(!limiter.is_allowed_at("alice", "test", start));

        // ウィンドウ経過後は古いエントリがパージされて再び許可される
        let later = start + Duration::from_secs(61);
        assert!(limiter.is_allowed_at("alice", "test", later));
    }

    #[test]
    fn identifiers_are_isolated() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.is_allowed_at("alice", "test", now));
        assert!(!limiter.is_allowed_at("alice", "test", now));
        // 別の識別子は独立したウィンドウを持つ
        assert!(limiter.is_allowed_at("bob", "test", now));
    }

    #[test]
    fn unknown_class_is_fail_open() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        for _ in 0..100 {
            assert!(limiter.is_allowed_at("alice", "nonexistent", now));
        }
        assert_eq!(limiter.remaining_at("alice", "nonexistent", now), u32::MAX);
    }

    #[test]
    fn remaining_counts_down_and_clamps_at_zero() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        assert_eq!(limiter.remaining_at("alice", "test", now), 2);
        limiter.is_allowed_at("alice", "test", now);
        assert_eq!(limiter.remaining_at("alice", "test", now), 1);
        limiter.is_allowed_at("alice", "test", now);
        assert_eq!(limiter.remaining_at("alice", "test", now), 0);
        // 拒否されたリクエストは消費しない
        limiter.is_allowed_at("alice", "test", now);
        assert_eq!(limiter.remaining_at("alice", "test", now), 0);
    }

    #[test]
    fn default_classes_match_expected_table() {
        let classes = default_classes();
        assert_eq!(classes["command"].max_requests, 60);
        assert_eq!(classes["command"].window_seconds, 60);
        assert_eq!(classes["api_request"].max_requests, 1000);
        assert_eq!(classes["api_request"].window_seconds, 3600);
        assert_eq!(classes["file_search"].max_requests, 20);
        assert_eq!(classes["file_search"].window_seconds, 60);
    }

    #[test]
    fn concurrent_checks_never_over_admit() {
        use std::sync::Arc;

        let limiter = Arc::new(limiter(50, 60));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u32;
                for _ in 0..20 {
                    if limiter.is_allowed("alice", "test") {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }
}
