use rand::Rng;
use url::Url;

use modelgate_channel_core::{ChannelError, ChannelGroup, ChannelResult, Upstream};

/// Builder-time group validation: at least one upstream, all parseable.
pub(crate) fn require_upstreams(group: &ChannelGroup) -> ChannelResult<()> {
    if group.upstreams.is_empty() {
        return Err(ChannelError::InvalidGroup(format!(
            "group {} has no upstreams",
            group.name
        )));
    }
    for upstream in &group.upstreams {
        let url = Url::parse(upstream.url.trim()).map_err(|err| {
            ChannelError::InvalidGroup(format!("invalid upstream url {:?}: {err}", upstream.url))
        })?;
        if !url.has_host() {
            return Err(ChannelError::InvalidGroup(format!(
                "upstream url {:?} has no host",
                upstream.url
            )));
        }
    }
    Ok(())
}

/// Picks one upstream from the group by weighted random selection.
///
/// Zero-weight entries are skipped unless every entry has zero weight, in
/// which case selection is uniform over all of them.
pub fn select_upstream(group: &ChannelGroup) -> ChannelResult<&Upstream> {
    if group.upstreams.is_empty() {
        return Err(ChannelError::InvalidGroup(format!(
            "group {} has no upstreams",
            group.name
        )));
    }
    if group.upstreams.len() == 1 {
        return Ok(&group.upstreams[0]);
    }

    let total: u64 = group.upstreams.iter().map(|u| u64::from(u.weight)).sum();
    let mut rng = rand::rng();
    if total == 0 {
        let idx = rng.random_range(0..group.upstreams.len());
        return Ok(&group.upstreams[idx]);
    }

    let mut remaining = rng.random_range(0..total);
    for upstream in &group.upstreams {
        let weight = u64::from(upstream.weight);
        if weight == 0 {
            continue;
        }
        if remaining < weight {
            return Ok(upstream);
        }
        remaining -= weight;
    }
    // Unreachable with a correct running sum; picking the last entry is a
    // safe fallback either way.
    Ok(&group.upstreams[group.upstreams.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_is_rejected() {
        let group = ChannelGroup::new("g", "openai", Vec::new());
        assert!(matches!(
            select_upstream(&group),
            Err(ChannelError::InvalidGroup(_))
        ));
    }

    #[test]
    fn single_upstream_is_always_chosen() {
        let group = ChannelGroup::new(
            "g",
            "openai",
            vec![Upstream::new("https://api.openai.com")],
        );
        for _ in 0..8 {
            assert_eq!(select_upstream(&group).unwrap().url, "https://api.openai.com");
        }
    }

    #[test]
    fn zero_weight_entries_are_skipped() {
        let group = ChannelGroup::new(
            "g",
            "openai",
            vec![
                Upstream::weighted("https://a.example", 0),
                Upstream::weighted("https://b.example", 5),
            ],
        );
        for _ in 0..32 {
            assert_eq!(select_upstream(&group).unwrap().url, "https://b.example");
        }
    }

    #[test]
    fn all_zero_weights_fall_back_to_uniform() {
        let group = ChannelGroup::new(
            "g",
            "openai",
            vec![
                Upstream::weighted("https://a.example", 0),
                Upstream::weighted("https://b.example", 0),
            ],
        );
        // Selection must still succeed.
        let chosen = select_upstream(&group).unwrap();
        assert!(chosen.url == "https://a.example" || chosen.url == "https://b.example");
    }
}
