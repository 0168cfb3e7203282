//! Trust-score aggregation over credential collections.
//!
//! A pure, order-independent computation: the same credential content
//! always yields the same score. [`ScoreMemo`] adds a content-hash memo
//! so observers can skip recomputation (and downstream re-renders) when
//! the collection has not actually changed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::credential::{Credential, CredentialType};
use crate::{compute_content_hash, ContentHash};

/// Weight of the review sub-score in the total, out of 100.
const REVIEW_WEIGHT: u32 = 50;
/// Weight of the skill sub-score in the total, out of 100.
const SKILL_WEIGHT: u32 = 30;
/// Weight of the payment sub-score in the total, out of 100.
const PAYMENT_WEIGHT: u32 = 20;

/// Points per rating unit for reviews (a 5-star average maps to 100).
const RATING_SCALE: u32 = 20;
/// Review count at which the review sub-score reaches full confidence.
const REVIEW_FULL_CONFIDENCE: u32 = 5;
/// Points per distinct skill.
const SKILL_POINTS: u32 = 10;
/// Points per payment record.
const PAYMENT_POINTS: u32 = 5;

/// Trust tier bands over the total score.
///
/// Monotonic in the total; `Bronze` is the band containing 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl TrustTier {
    /// Map a clamped total score to its tier band.
    pub fn for_total(total: u32) -> Self {
        match total {
            0..=24 => Self::Bronze,
            25..=49 => Self::Silver,
            50..=74 => Self::Gold,
            _ => Self::Platinum,
        }
    }
}

/// Per-category sub-scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustBreakdown {
    /// From the count and integer-mean rating of review credentials.
    pub review_score: u32,
    /// From the count of distinct skill credentials.
    pub skill_score: u32,
    /// From the count of payment credentials.
    pub payment_score: u32,
}

/// Aggregate trust score: weighted total, tier, and breakdown.
///
/// Derived data, never persisted; a pure view over current cache
/// contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustScore {
    /// Weighted combination of the sub-scores, clamped to `[0, 100]`.
    pub total: u32,
    /// Tier band containing `total`.
    pub tier: TrustTier,
    /// Per-category sub-scores.
    pub breakdown: TrustBreakdown,
}

impl TrustScore {
    /// The exact score of an empty credential collection.
    pub fn zero() -> Self {
        Self {
            total: 0,
            tier: TrustTier::Bronze,
            breakdown: TrustBreakdown::default(),
        }
    }
}

impl Default for TrustScore {
    fn default() -> Self {
        Self::zero()
    }
}

/// Compute the trust score for a collection of credentials.
///
/// Order-independent: any permutation of the input yields the same
/// result. The empty collection yields exactly [`TrustScore::zero`].
pub fn compute_trust_score(credentials: &[Credential]) -> TrustScore {
    if credentials.is_empty() {
        return TrustScore::zero();
    }

    let mut rating_sum: u32 = 0;
    let mut review_count: u32 = 0;
    let mut payment_count: u32 = 0;
    let mut skills: HashSet<&str> = HashSet::new();

    for credential in credentials {
        match credential.credential_type {
            CredentialType::Review => {
                if let Some(rating) = credential.rating {
                    rating_sum += u32::from(rating);
                    review_count += 1;
                }
            }
            CredentialType::Skill => {
                skills.insert(credential.name.as_str());
            }
            CredentialType::Payment => payment_count += 1,
            CredentialType::Certification => {}
        }
    }

    let review_score = if review_count == 0 {
        0
    } else {
        // Integer-mean rating, scaled, ramped by review volume.
        let average = rating_sum / review_count;
        let confidence = review_count.min(REVIEW_FULL_CONFIDENCE);
        (average * RATING_SCALE * confidence / REVIEW_FULL_CONFIDENCE).min(100)
    };
    let skill_score = (skills.len() as u32 * SKILL_POINTS).min(100);
    let payment_score = (payment_count * PAYMENT_POINTS).min(100);

    let total = (review_score * REVIEW_WEIGHT
        + skill_score * SKILL_WEIGHT
        + payment_score * PAYMENT_WEIGHT)
        / 100;
    let total = total.min(100);

    TrustScore {
        total,
        tier: TrustTier::for_total(total),
        breakdown: TrustBreakdown {
            review_score,
            skill_score,
            payment_score,
        },
    }
}

/// Memoized trust-score computation keyed by collection content.
///
/// Recomputes only when the serialized credential content changes, not
/// merely when the collection is re-observed with the same content.
#[derive(Debug, Default)]
pub struct ScoreMemo {
    last: Option<(ContentHash, TrustScore)>,
}

impl ScoreMemo {
    /// Create an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Score the collection, reusing the previous result when the
    /// content is unchanged.
    ///
    /// If the collection cannot be serialized for hashing, the memo is
    /// bypassed and the score is computed directly.
    pub fn score(&mut self, credentials: &[Credential]) -> TrustScore {
        let Ok(bytes) = serde_json::to_vec(credentials) else {
            return compute_trust_score(credentials);
        };
        let hash = compute_content_hash(&bytes);
        if let Some((last_hash, last_score)) = &self.last {
            if *last_hash == hash {
                return *last_score;
            }
        }
        let score = compute_trust_score(credentials);
        self.last = Some((hash, score));
        score
    }
}
