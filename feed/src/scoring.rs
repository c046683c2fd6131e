use std::collections::{HashMap, HashSet};

use config_keys::RankingConfig;
use types::{
    post::{VideoData, VideoPerformance},
    profile::UserProfile,
    UnixMillis,
};

use crate::{
    consts::{
        FRESHNESS_TAIL_SCORE, MAX_SUB_SCORE, NEUTRAL_PERSONALIZED_SCORE, VIRALITY_ENGAGEMENT_SHARE,
        VIRALITY_FULL_WATCH_SECS, VIRALITY_RETENTION_SHARE, VIRALITY_WATCH_SHARE,
    },
    model::{Candidate, ScoredVideo, Signals, VideoRankingScore},
};

fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Decays from 100 at upload towards `freshness_floor`, halving the headroom
/// every `freshness_half_life_hours`.
///
/// A small share of the headroom falls off as `1 / (1 + age in half-lives)`
/// instead, which stays above the rounding error of the floor for any
/// realistic age. Both parts halve at one half-life.
pub fn freshness_score(hours_since_upload: f64, config: &RankingConfig) -> f64 {
    let floor = config.freshness_floor.clamp(0.0, MAX_SUB_SCORE);
    let half_life = config.freshness_half_life_hours.max(f64::MIN_POSITIVE);
    let age = hours_since_upload.max(0.0) / half_life;

    let tail = FRESHNESS_TAIL_SCORE.min(MAX_SUB_SCORE - floor);
    let decaying = MAX_SUB_SCORE - floor - tail;
    floor + decaying * 0.5_f64.powf(age) + tail / (1.0 + age)
}

/// Base score plus a bonus per hashtag and per title/description keyword
/// matching an interest of the viewer.
pub fn relevance_score(video: &VideoData, profile: &UserProfile, config: &RankingConfig) -> f64 {
    let interests: HashSet<String> = profile.interests.iter().map(|i| normalize_tag(i)).collect();
    if interests.is_empty() {
        return config.relevance_base.min(MAX_SUB_SCORE);
    }

    let hashtags: HashSet<String> = video.hashtags.iter().map(|h| normalize_tag(h)).collect();
    let hashtag_matches = hashtags.intersection(&interests).count();

    let words: HashSet<String> = video
        .title
        .split(|c: char| !c.is_alphanumeric())
        .chain(video.description.split(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let keyword_matches = interests
        .iter()
        .filter(|i| !hashtags.contains(*i) && words.contains(*i))
        .count();

    let score = config.relevance_base
        + config.hashtag_match_bonus * hashtag_matches as f64
        + config.keyword_match_bonus * keyword_matches as f64;
    score.min(MAX_SUB_SCORE)
}

/// Average engagement of the uploader's recent videos mapped into 0..=100.
/// Uploaders without watched videos get `default_trust`.
pub fn trust_score(recent_uploads: &[VideoData], config: &RankingConfig) -> f64 {
    let rates: Vec<f64> = recent_uploads
        .iter()
        .take(config.trust_history_len)
        .filter(|v| v.views > 0)
        .map(VideoData::engagement_rate)
        .collect();
    if rates.is_empty() {
        return config.default_trust;
    }

    let average = rates.iter().sum::<f64>() / rates.len() as f64;
    let full = config.trust_full_engagement.max(f64::MIN_POSITIVE);
    (average / full).min(1.0) * MAX_SUB_SCORE
}

/// Precomputed virality when present, otherwise a mix of engagement,
/// retention and watch time. 0 without performance data.
pub fn virality_score(performance: Option<&VideoPerformance>, config: &RankingConfig) -> f64 {
    let Some(perf) = performance else {
        return 0.0;
    };
    if let Some(score) = perf.virality_score {
        return score.clamp(0.0, MAX_SUB_SCORE);
    }

    let full = config.trust_full_engagement.max(f64::MIN_POSITIVE);
    let engagement = (perf.engagement_rate / full).clamp(0.0, 1.0);
    let retention = (1.0 - perf.skip_rate).clamp(0.0, 1.0);
    let watch = (perf.avg_watch_time / VIRALITY_FULL_WATCH_SECS).clamp(0.0, 1.0);

    engagement * VIRALITY_ENGAGEMENT_SHARE
        + retention * VIRALITY_RETENTION_SHARE
        + watch * VIRALITY_WATCH_SHARE
}

/// How the video's engagement compares with what this viewer usually engages
/// with, penalized for frequent skippers on often-skipped videos.
pub fn personalized_score(
    video: &VideoData,
    profile: &UserProfile,
    performance: Option<&VideoPerformance>,
    config: &RankingConfig,
) -> f64 {
    let expected = profile
        .engagement_rate
        .max(config.baseline_engagement)
        .max(f64::MIN_POSITIVE);
    let affinity = (video.engagement_rate() / expected).min(2.0);
    let skip_rate = performance.map(|p| p.skip_rate).unwrap_or_default();

    let score = NEUTRAL_PERSONALIZED_SCORE * affinity
        - config.skip_penalty * profile.skip_pattern * skip_rate;
    score.clamp(0.0, MAX_SUB_SCORE)
}

/// Amplifies videos engaging above `min_engagement_rate` (up to
/// `max_engagement_boost`) or viral above `virality_threshold`.
pub fn boost_factor(video: &VideoData, virality: f64, config: &RankingConfig) -> f64 {
    let mut boost: f64 = 1.0;
    let rate = video.engagement_rate();
    if config.min_engagement_rate > 0.0 && rate > config.min_engagement_rate {
        boost = (rate / config.min_engagement_rate).min(config.max_engagement_boost);
    }
    if virality > config.virality_threshold {
        boost = boost.max(config.viral_boost);
    }
    boost.max(1.0)
}

pub fn calculate_video_score(
    candidate: &Candidate,
    profile: &UserProfile,
    signals: &Signals,
    config: &RankingConfig,
    now: UnixMillis,
) -> VideoRankingScore {
    let video = &candidate.video;
    let performance = signals.performance.as_ref();

    let freshness = freshness_score(video.hours_since_upload(now), config);
    let relevance = relevance_score(video, profile, config);
    let trust = signals.uploader_trust;
    let virality = virality_score(performance, config);
    let personalized = personalized_score(video, profile, performance, config);
    let boost_factor = boost_factor(video, virality, config);
    let follow_boost = if candidate.from_followed {
        config.follow_boost
    } else {
        1.0
    };

    let base = freshness * config.freshness_weight
        + relevance * config.relevance_weight
        + trust * config.trust_weight
        + virality * config.virality_weight
        + personalized * config.personalized_weight;

    VideoRankingScore {
        freshness,
        relevance,
        trust,
        virality,
        personalized,
        boost_factor,
        follow_boost,
        final_score: base * boost_factor * follow_boost,
    }
}

/// Caps every creator at `ceil(len * diversity_factor)` videos, keeping order.
pub fn diversity_filter(ranked: Vec<ScoredVideo>, diversity_factor: f64) -> Vec<ScoredVideo> {
    let cap = ((ranked.len() as f64 * diversity_factor.clamp(0.0, 1.0)).ceil() as usize).max(1);
    let mut per_creator: HashMap<String, usize> = HashMap::new();

    ranked
        .into_iter()
        .filter(|scored| {
            let count = per_creator.entry(scored.video.user_id.clone()).or_default();
            *count += 1;
            *count <= cap
        })
        .collect()
}

/// Scores, sorts, diversifies and truncates.
pub fn rank(
    candidates: Vec<(Candidate, Signals)>,
    profile: &UserProfile,
    config: &RankingConfig,
    feed_size: usize,
    now: UnixMillis,
) -> Vec<ScoredVideo> {
    let mut scored: Vec<ScoredVideo> = candidates
        .into_iter()
        .map(|(candidate, signals)| {
            let score = calculate_video_score(&candidate, profile, &signals, config, now);
            ScoredVideo {
                video: candidate.video,
                from_followed: candidate.from_followed,
                score,
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.final_score.total_cmp(&a.score.final_score));

    let mut feed = diversity_filter(scored, config.diversity_factor);
    feed.truncate(feed_size);
    feed
}

#[cfg(test)]
mod tests {
    use types::MILLIS_PER_HOUR;

    use super::*;

    const NOW: UnixMillis = 1_000 * MILLIS_PER_HOUR;

    fn video(id: &str, creator: &str, created_at: UnixMillis) -> VideoData {
        VideoData {
            id: id.into(),
            user_id: creator.into(),
            created_at,
            ..Default::default()
        }
    }

    fn candidate(video: VideoData) -> (Candidate, Signals) {
        (
            Candidate {
                video,
                from_followed: false,
            },
            Signals {
                performance: None,
                uploader_trust: 50.0,
            },
        )
    }

    #[test]
    fn newer_uploads_are_strictly_fresher() {
        let config = RankingConfig::default();
        let mut previous = f64::INFINITY;
        for hours in [0.0, 0.5, 1.0, 6.0, 24.0, 72.0, 240.0] {
            let score = freshness_score(hours, &config);
            assert!(score < previous, "{hours}h scored {score}");
            assert!(score > config.freshness_floor);
            previous = score;
        }
        assert_eq!(freshness_score(0.0, &config), 100.0);
        assert!((freshness_score(24.0, &config) - 55.0).abs() < 1e-9);
    }

    #[test]
    fn months_old_uploads_still_order_by_age() {
        let config = RankingConfig::default();
        let now = 400 * 24 * MILLIS_PER_HOUR;
        let days_old = |days: u64| {
            let v = video("v", "c", now - days * 24 * MILLIS_PER_HOUR);
            freshness_score(v.hours_since_upload(now), &config)
        };

        let (sixty, ninety, year) = (days_old(60), days_old(90), days_old(365));
        assert!(sixty > ninety, "60 days {sixty} vs 90 days {ninety}");
        assert!(ninety > year, "90 days {ninety} vs a year {year}");
        assert!(year > config.freshness_floor);
    }

    #[test]
    fn relevance_counts_hashtags_and_keywords() {
        let config = RankingConfig::default();
        let mut profile = UserProfile::new("p", 0);
        profile.interests = vec!["cats".into(), "Piano".into(), "rust".into()];

        let mut v = video("v", "c", 0);
        v.hashtags = vec!["#cats".into(), "dogs".into()];
        v.title = "Cat plays piano".into();
        assert_eq!(relevance_score(&v, &profile, &config), 80.0);

        v.hashtags.push("piano".into());
        v.description = "written in rust".into();
        assert_eq!(relevance_score(&v, &profile, &config), 100.0);

        v.hashtags.push("rust".into());
        assert_eq!(relevance_score(&v, &profile, &config), 100.0);
    }

    #[test]
    fn trust_defaults_without_history() {
        let config = RankingConfig::default();
        assert_eq!(trust_score(&[], &config), 50.0);
        assert_eq!(trust_score(&[video("v", "c", 0)], &config), 50.0);

        let mut engaging = video("v", "c", 0);
        engaging.views = 100;
        engaging.likes = 10;
        assert!((trust_score(&[engaging.clone()], &config) - 50.0).abs() < 1e-9);
        engaging.likes = 50;
        assert_eq!(trust_score(&[engaging], &config), 100.0);
    }

    #[test]
    fn virality_prefers_precomputed_score() {
        let config = RankingConfig::default();
        assert_eq!(virality_score(None, &config), 0.0);

        let perf = VideoPerformance {
            engagement_rate: 0.2,
            skip_rate: 0.0,
            avg_watch_time: 60.0,
            virality_score: None,
        };
        assert_eq!(virality_score(Some(&perf), &config), 100.0);

        let scored = VideoPerformance {
            virality_score: Some(42.0),
            ..perf
        };
        assert_eq!(virality_score(Some(&scored), &config), 42.0);
    }

    #[test]
    fn boost_is_capped() {
        let config = RankingConfig::default();
        let mut v = video("v", "c", 0);
        v.views = 10;
        v.likes = 10;
        assert_eq!(boost_factor(&v, 0.0, &config), 3.0);

        v.likes = 0;
        assert_eq!(boost_factor(&v, 0.0, &config), 1.0);
        assert_eq!(boost_factor(&v, 90.0, &config), 1.5);
    }

    #[test]
    fn followed_creators_are_boosted() {
        let config = RankingConfig::default();
        let profile = UserProfile::new("p", 0);
        let (mut c, signals) = candidate(video("v", "c", NOW));
        let plain = calculate_video_score(&c, &profile, &signals, &config, NOW);
        c.from_followed = true;
        let followed = calculate_video_score(&c, &profile, &signals, &config, NOW);
        assert!((followed.final_score - plain.final_score * 1.2).abs() < 1e-9);
    }

    #[test]
    fn one_creator_cannot_dominate() {
        let config = RankingConfig::default();
        let profile = UserProfile::new("p", 0);
        let candidates: Vec<_> = (0..20)
            .map(|i| {
                let creator = if i < 15 { "x" } else { "other" };
                // creator x uploaded the most recent videos
                let age = if i < 15 { i } else { 100 + i };
                candidate(video(&format!("v{i}"), creator, NOW - age * MILLIS_PER_HOUR))
            })
            .collect();

        let feed = rank(candidates, &profile, &config, 20, NOW);
        let from_x = feed.iter().filter(|s| s.video.user_id == "x").count();
        assert_eq!(from_x, 8);
        assert_eq!(feed.len(), 13);
        assert!(feed
            .windows(2)
            .all(|w| w[0].score.final_score >= w[1].score.final_score));
    }

    #[test]
    fn diversity_keeps_at_least_one_per_creator() {
        let scored = |id: &str| ScoredVideo {
            video: video(id, "x", 0),
            from_followed: false,
            score: VideoRankingScore::default(),
        };
        let kept = diversity_filter(vec![scored("a"), scored("b")], 0.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].video.id, "a");
    }
}
