use config_keys::RankingConfig;
use types::{profile::UserProfile, UnixMillis};

use crate::model::Interaction;

fn smooth(current: f64, sample: f64, factor: f64) -> f64 {
    current + (sample - current) * factor.clamp(0.0, 1.0)
}

/// Folds one interaction into the viewer's profile.
///
/// Averages move by `profile_smoothing` towards the new sample. Hashtags of
/// videos the viewer did not skip become interests, most recent first, bounded
/// by `max_interests`.
pub fn apply_interaction(
    profile: &mut UserProfile,
    interaction: &Interaction,
    hashtags: &[String],
    config: &RankingConfig,
    now: UnixMillis,
) {
    let factor = config.profile_smoothing;
    profile.avg_watch_time = smooth(
        profile.avg_watch_time,
        interaction.watch_time_secs.max(0.0),
        factor,
    );
    profile.engagement_rate = smooth(
        profile.engagement_rate,
        if interaction.engaged() { 1.0 } else { 0.0 },
        factor,
    );
    profile.skip_pattern = smooth(
        profile.skip_pattern,
        if interaction.skipped { 1.0 } else { 0.0 },
        factor,
    );
    profile.last_active = profile.last_active.max(now);

    if interaction.skipped {
        return;
    }
    for tag in hashtags.iter().rev() {
        let tag = tag.trim().trim_start_matches('#');
        if tag.is_empty() {
            continue;
        }
        profile.interests.retain(|i| !i.eq_ignore_ascii_case(tag));
        profile.interests.insert(0, tag.to_lowercase());
    }
    profile.interests.truncate(config.max_interests);
}
