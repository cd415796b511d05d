//! Token counting and the budget-bounded prefix search.
//!
//! The counter is backed by tiktoken-rs with an xxh64-keyed moka cache so
//! repeated measurements during the search stay cheap. Long texts are
//! estimated from a ~1%-stride line sample and extrapolated linearly by
//! character-length ratio rather than tokenized in full.

use anyhow::{Context, Result, anyhow};
use moka::sync::Cache;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base};
use xxhash_rust::xxh64::Xxh64;

/// Texts shorter than this are tokenized directly instead of sampled.
const DIRECT_COUNT_LIMIT: usize = 200;

/// Empirical tokens-per-entry estimate used to seed the binary search.
const TOKENS_PER_ENTRY: usize = 25;

/// Relative deviation from the budget at which the search stops early.
const BUDGET_TOLERANCE: f64 = 0.15;

/// Token counter backed by tiktoken-rs with token-count caching.
pub struct TokenCounter {
    /// Byte Pair Encoding tokenizer
    bpe: CoreBPE,

    /// Token count cache keyed by xxh64 of the text
    cache: Cache<u64, usize>,
}

impl TokenCounter {
    /// Create a counter for a model name (e.g. "gpt-4o") or an encoding
    /// name ("cl100k_base", "o200k_base").
    pub fn new(model_or_encoding: &str) -> Result<Self> {
        let lower = model_or_encoding.to_ascii_lowercase();

        let bpe = match get_bpe_from_model(&lower) {
            Ok(b) => b,
            Err(_) => match lower.as_str() {
                "o200k_base" => o200k_base().context("load o200k_base")?,
                "cl100k_base" => cl100k_base().context("load cl100k_base")?,
                _ => return Err(anyhow!("Unsupported model/encoding: {model_or_encoding}")),
            },
        };

        Ok(Self {
            bpe,
            cache: Cache::new(100_000),
        })
    }

    /// Exact token count, cached.
    pub fn count(&self, s: &str) -> usize {
        let mut hasher = Xxh64::new(0);
        hasher.update(s.as_bytes());
        let key = hasher.digest();

        if let Some(t) = self.cache.get(&key) {
            return t;
        }

        let t = self.bpe.encode_ordinary(s).len();
        self.cache.insert(key, t);
        t
    }

    /// Cheap token estimate for repeated measurement: exact under
    /// [`DIRECT_COUNT_LIMIT`] characters, otherwise a ~1% line sample
    /// extrapolated by character-length ratio.
    pub fn estimate(&self, s: &str) -> usize {
        if s.len() < DIRECT_COUNT_LIMIT {
            return self.count(s);
        }

        let lines: Vec<&str> = s.split_inclusive('\n').collect();
        let step = (lines.len() / 100).max(1);

        let sample: String = lines.iter().step_by(step).copied().collect();
        if sample.is_empty() {
            return 0;
        }

        let sample_tokens = self.count(&sample) as f64;
        (sample_tokens / sample.len() as f64 * s.len() as f64) as usize
    }
}

/// Bounded binary search over ranked-list prefixes: find the largest
/// prefix whose rendered text fits `max_tokens` within tolerance.
///
/// `render` maps a prefix length to rendered text; it is re-invoked per
/// probe (callers cache per-file rendering underneath). When no probe
/// fits the budget, the smallest rendered candidate is returned, which
/// may be an empty string.
pub fn find_best_prefix<F>(
    counter: &TokenCounter,
    num_entries: usize,
    max_tokens: usize,
    mut render: F,
) -> String
where
    F: FnMut(usize) -> String,
{
    if max_tokens == 0 {
        return String::new();
    }

    let mut lower: i64 = 0;
    let mut upper: i64 = num_entries as i64;

    let mut best: Option<String> = None;
    let mut best_tokens: usize = 0;

    // Track the smallest candidate for the no-fit fallback
    let mut smallest: Option<(usize, String)> = None;

    // Seed near the expected answer instead of the midpoint
    let mut middle: i64 = (max_tokens / TOKENS_PER_ENTRY).min(num_entries) as i64;

    while lower <= upper {
        let text = render(middle as usize);
        let tokens = counter.estimate(&text);

        if smallest.as_ref().is_none_or(|(t, _)| tokens < *t) {
            smallest = Some((tokens, text.clone()));
        }

        let pct_err = (tokens as f64 - max_tokens as f64).abs() / max_tokens as f64;

        if (tokens <= max_tokens && tokens > best_tokens) || pct_err < BUDGET_TOLERANCE {
            best_tokens = tokens;
            best = Some(text);

            if pct_err < BUDGET_TOLERANCE {
                break;
            }
        }

        if tokens < max_tokens {
            lower = middle + 1;
        } else {
            upper = middle - 1;
        }

        middle = (lower + upper) / 2;
    }

    best.or_else(|| smallest.map(|(_, text)| text))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> TokenCounter {
        TokenCounter::new("cl100k_base").expect("encoding")
    }

    fn synthetic_render(prefix: usize) -> String {
        (0..prefix)
            .map(|i| format!("src/module_{i}.py:\n│def handler_{i}(request):\n"))
            .collect()
    }

    #[test]
    fn short_text_estimate_is_exact() {
        let c = counter();
        let text = "fn main() { println!(\"hi\"); }";
        assert!(text.len() < 200);
        assert_eq!(c.estimate(text), c.count(text));
    }

    #[test]
    fn long_text_estimate_tracks_exact_count() {
        let c = counter();
        let text: String = (0..500)
            .map(|i| format!("pub fn generated_function_{i}() -> usize {{ {i} }}\n"))
            .collect();

        let exact = c.count(&text) as f64;
        let est = c.estimate(&text) as f64;

        // Uniform lines, so the sample should extrapolate closely
        assert!((est - exact).abs() / exact < 0.10, "est {est} vs exact {exact}");
    }

    #[test]
    fn count_is_cached_and_stable() {
        let c = counter();
        assert_eq!(c.count("compute_total(x)"), c.count("compute_total(x)"));
    }

    #[test]
    fn prefix_search_respects_budget() {
        let c = counter();
        let out = find_best_prefix(&c, 200, 300, synthetic_render);

        let tokens = c.count(&out);
        // Within tolerance above, or under budget
        assert!(tokens as f64 <= 300.0 * (1.0 + BUDGET_TOLERANCE));
        assert!(!out.is_empty());
    }

    #[test]
    fn larger_budgets_never_shrink_the_prefix() {
        let c = counter();
        let mut prev_lines = 0usize;

        for budget in [100usize, 300, 600, 1200] {
            let out = find_best_prefix(&c, 120, budget, synthetic_render);
            let lines = out.lines().count();
            assert!(
                lines >= prev_lines,
                "budget {budget} produced {lines} lines, fewer than {prev_lines}"
            );
            prev_lines = lines;
        }
    }

    #[test]
    fn zero_budget_and_zero_entries() {
        let c = counter();
        assert_eq!(find_best_prefix(&c, 100, 0, synthetic_render), "");
        assert_eq!(find_best_prefix(&c, 0, 1000, synthetic_render), "");
    }
}
