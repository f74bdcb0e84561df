//! Retention rule evaluation.
//!
//! Pure: the verdict depends only on the item's facts, the active rules and
//! which integrations are usable in the current cycle.

use chrono::{DateTime, Utc};
use media_prune_config::{AdvancedRule, Retention, RuleMatcher, RulesConfig, UserIdentifier, UserMatcher};
use media_prune_models::{MediaItem, MediaType, Requester, RuleSource};

/// Rules and integration availability for one evaluation pass.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub rules: &'a RulesConfig,
    pub advanced_rules: &'a [AdvancedRule],
    /// History tracker enabled and its fetch succeeded this cycle
    pub history_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// `None` means never delete
    pub deletion_date: Option<DateTime<Utc>>,
    pub reason: String,
    pub rule_source: RuleSource,
}

impl Verdict {
    pub fn apply_to(self, item: &mut MediaItem) {
        item.deletion_date = self.deletion_date;
        item.deletion_reason = self.reason;
        item.rule_source = Some(self.rule_source);
    }
}

/// Effective settings once a rule (or the global fallback) has matched.
struct Matched {
    source: RuleSource,
    label: String,
    retention: Retention,
    require_watched: bool,
    /// Clock starts at the last watch instead of the import date
    from_last_watch: bool,
}

pub fn evaluate(item: &MediaItem, ctx: &RuleContext<'_>) -> Verdict {
    if let Some(exclusion) = &item.exclusion {
        return Verdict {
            deletion_date: None,
            reason: format!("excluded: {}", exclusion.reason),
            rule_source: RuleSource::Excluded,
        };
    }

    let matched = ctx
        .advanced_rules
        .iter()
        .filter(|rule| rule.enabled)
        .find_map(|rule| match_rule(rule, item, ctx))
        .unwrap_or_else(|| global(item.media_type, ctx.rules));

    schedule(item, matched, ctx)
}

fn global(media_type: MediaType, rules: &RulesConfig) -> Matched {
    let label = match media_type {
        MediaType::Movie => "movie retention",
        MediaType::Series => "tv retention",
    };
    Matched {
        source: RuleSource::Global,
        label: label.to_string(),
        retention: rules.retention_for(media_type),
        require_watched: false,
        from_last_watch: false,
    }
}

fn match_rule(rule: &AdvancedRule, item: &MediaItem, ctx: &RuleContext<'_>) -> Option<Matched> {
    let source = RuleSource::Advanced {
        name: rule.name.clone(),
        kind: rule.matcher.kind().to_string(),
    };
    let label = format!("{} rule '{}'", rule.matcher.kind(), rule.name);

    match &rule.matcher {
        RuleMatcher::Tag { tag } => {
            let tag = tag.trim();
            item.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag)).then(|| Matched {
                source,
                label,
                retention: rule.retention,
                require_watched: rule.require_watched,
                from_last_watch: rule.require_watched,
            })
        }
        RuleMatcher::User { users } => {
            let requester = item.requester.as_ref()?;
            let user = users.iter().find(|u| user_matches(u, requester))?;
            let require_watched = user.require_watched.unwrap_or(rule.require_watched);
            Some(Matched {
                source,
                label,
                retention: user.retention.unwrap_or(rule.retention),
                require_watched,
                from_last_watch: require_watched,
            })
        }
        RuleMatcher::Watched => (ctx.history_enabled && item.has_watch_history()).then(|| Matched {
            source,
            label,
            retention: rule.retention,
            require_watched: rule.require_watched,
            from_last_watch: true,
        }),
    }
}

/// Compare on the entry's first non-empty identifier only.
fn user_matches(user: &UserMatcher, requester: &Requester) -> bool {
    match user.identifier() {
        Some(UserIdentifier::Id(id)) => requester.user_id == Some(id),
        Some(UserIdentifier::Username(name)) => requester
            .username
            .as_deref()
            .map(|u| u.trim().eq_ignore_ascii_case(name))
            .unwrap_or(false),
        Some(UserIdentifier::Email(email)) => requester
            .email
            .as_deref()
            .map(|e| e.trim().eq_ignore_ascii_case(email))
            .unwrap_or(false),
        None => false,
    }
}

fn schedule(item: &MediaItem, matched: Matched, ctx: &RuleContext<'_>) -> Verdict {
    let never = |reason: String, source: RuleSource| Verdict {
        deletion_date: None,
        reason,
        rule_source: source,
    };

    if matched.require_watched {
        if !ctx.history_enabled {
            return never(
                format!("{}: requires watch history, which is unavailable", matched.label),
                matched.source,
            );
        }
        if !item.has_watch_history() {
            return never(format!("{}: not watched yet", matched.label), matched.source);
        }
    }

    let (reference, anchor) = if matched.from_last_watch {
        match item.history_watched_at {
            Some(watched) => (watched, "last watched"),
            None => return never(format!("{}: not watched yet", matched.label), matched.source),
        }
    } else {
        (item.added_at, "added")
    };

    match matched.retention.deletion_date(reference) {
        None => never(format!("{}: kept forever", matched.label), matched.source),
        Some(date) => Verdict {
            deletion_date: Some(date),
            reason: format!("{}: {} after {}", matched.label, matched.retention, anchor),
            rule_source: matched.source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use media_prune_models::{Exclusion, MediaIds};

    fn movie(added_days_ago: i64) -> MediaItem {
        MediaItem::new(
            "movie:tmdb:1".to_string(),
            MediaIds {
                tmdb_id: Some(1),
                ..MediaIds::default()
            },
            "Movie".to_string(),
            MediaType::Movie,
            "/movies/movie.mkv".to_string(),
            Utc::now() - Duration::days(added_days_ago),
        )
    }

    fn rules(movie: &str, tv: &str) -> RulesConfig {
        RulesConfig {
            movie_retention: movie.parse().unwrap(),
            tv_retention: tv.parse().unwrap(),
        }
    }

    fn rule(name: &str, retention: &str, require_watched: bool, matcher: RuleMatcher) -> AdvancedRule {
        AdvancedRule {
            name: name.to_string(),
            enabled: true,
            retention: retention.parse().unwrap(),
            require_watched,
            matcher,
        }
    }

    fn ctx<'a>(rules: &'a RulesConfig, advanced: &'a [AdvancedRule], history: bool) -> RuleContext<'a> {
        RuleContext {
            rules,
            advanced_rules: advanced,
            history_enabled: history,
        }
    }

    #[test]
    fn test_exclusion_wins_over_every_rule() {
        let global = rules("0d", "0d");
        let advanced = vec![rule("all", "0d", false, RuleMatcher::Tag { tag: "x".to_string() })];
        let mut item = movie(400);
        item.tags = vec!["x".to_string()];
        item.exclusion = Some(Exclusion {
            reason: "family favourite".to_string(),
            excluded_at: Utc::now(),
        });

        let verdict = evaluate(&item, &ctx(&global, &advanced, true));
        assert_eq!(verdict.deletion_date, None);
        assert_eq!(verdict.rule_source, RuleSource::Excluded);
        assert_eq!(verdict.reason, "excluded: family favourite");
    }

    #[test]
    fn test_global_retention_from_added_date() {
        let global = rules("7d", "never");
        let item = movie(3);
        let verdict = evaluate(&item, &ctx(&global, &[], false));
        assert_eq!(verdict.deletion_date, Some(item.added_at + Duration::days(7)));
        assert_eq!(verdict.rule_source, RuleSource::Global);
        assert!(verdict.reason.contains("7d after added"));

        let mut series = movie(3);
        series.media_type = MediaType::Series;
        assert_eq!(evaluate(&series, &ctx(&global, &[], false)).deletion_date, None);
    }

    #[test]
    fn test_zero_retention_is_due_at_reference() {
        let global = rules("90d", "90d");
        let advanced = vec![rule("kids", "0d", false, RuleMatcher::Tag { tag: "KIDS".to_string() })];
        let mut item = movie(1);
        item.tags = vec!["kids".to_string()];

        let verdict = evaluate(&item, &ctx(&global, &advanced, false));
        assert_eq!(verdict.deletion_date, Some(item.added_at));
        assert!(matches!(verdict.rule_source, RuleSource::Advanced { ref name, .. } if name == "kids"));
    }

    #[test]
    fn test_first_enabled_match_wins() {
        let global = rules("90d", "90d");
        let mut disabled = rule("disabled", "1d", false, RuleMatcher::Tag { tag: "a".to_string() });
        disabled.enabled = false;
        let advanced = vec![
            disabled,
            rule("second", "5d", false, RuleMatcher::Tag { tag: "a".to_string() }),
            rule("third", "9d", false, RuleMatcher::Tag { tag: "a".to_string() }),
        ];
        let mut item = movie(1);
        item.tags = vec!["A".to_string()];

        let verdict = evaluate(&item, &ctx(&global, &advanced, false));
        assert_eq!(verdict.deletion_date, Some(item.added_at + Duration::days(5)));
    }

    #[test]
    fn test_require_watched_protects_when_history_disabled() {
        let global = rules("90d", "90d");
        let advanced = vec![rule("tagged", "1d", true, RuleMatcher::Tag { tag: "t".to_string() })];
        let mut item = movie(100);
        item.tags = vec!["t".to_string()];
        item.history_watched_at = Some(Utc::now() - Duration::days(50));

        let verdict = evaluate(&item, &ctx(&global, &advanced, false));
        assert_eq!(verdict.deletion_date, None);
        assert!(matches!(verdict.rule_source, RuleSource::Advanced { .. }));
    }

    #[test]
    fn test_require_watched_protects_unwatched_items() {
        let global = rules("90d", "90d");
        let advanced = vec![rule("tagged", "1d", true, RuleMatcher::Tag { tag: "t".to_string() })];
        let mut item = movie(100);
        item.tags = vec!["t".to_string()];
        // Media server play count alone is not watch history
        item.watch.play_count = 4;
        item.watch.last_played = Some(Utc::now() - Duration::days(30));

        let verdict = evaluate(&item, &ctx(&global, &advanced, true));
        assert_eq!(verdict.deletion_date, None);
        assert!(verdict.reason.contains("not watched"));
    }

    #[test]
    fn test_require_watched_counts_from_last_watch() {
        let global = rules("90d", "90d");
        let advanced = vec![rule("tagged", "10d", true, RuleMatcher::Tag { tag: "t".to_string() })];
        let watched = Utc::now() - Duration::days(2);
        let mut item = movie(100);
        item.tags = vec!["t".to_string()];
        item.history_watched_at = Some(watched);

        let verdict = evaluate(&item, &ctx(&global, &advanced, true));
        assert_eq!(verdict.deletion_date, Some(watched + Duration::days(10)));
        assert!(verdict.reason.contains("after last watched"));
    }

    #[test]
    fn test_watched_rule_matches_only_with_history() {
        let global = rules("never", "never");
        let advanced = vec![rule("seen", "3d", false, RuleMatcher::Watched)];
        let watched = Utc::now() - Duration::days(1);
        let mut item = movie(100);

        assert_eq!(evaluate(&item, &ctx(&global, &advanced, true)).rule_source, RuleSource::Global);

        item.history_watched_at = Some(watched);
        let verdict = evaluate(&item, &ctx(&global, &advanced, true));
        assert_eq!(verdict.deletion_date, Some(watched + Duration::days(3)));

        // History fetch failed this cycle: the rule behaves as disabled
        assert_eq!(evaluate(&item, &ctx(&global, &advanced, false)).rule_source, RuleSource::Global);
    }

    #[test]
    fn test_user_rule_uses_first_identifier_and_overrides() {
        let global = rules("90d", "90d");
        let advanced = vec![rule(
            "requests",
            "14d",
            false,
            RuleMatcher::User {
                users: vec![
                    UserMatcher {
                        user_id: Some(7),
                        // ignored: the id is the first identifier
                        username: Some("nobody".to_string()),
                        retention: Some("never".parse().unwrap()),
                        ..UserMatcher::default()
                    },
                    UserMatcher {
                        username: Some("Alice".to_string()),
                        ..UserMatcher::default()
                    },
                    UserMatcher {
                        email: Some("BOB@example.com".to_string()),
                        retention: Some("2d".parse().unwrap()),
                        ..UserMatcher::default()
                    },
                ],
            },
        )];
        let ctx = ctx(&global, &advanced, false);

        let mut item = movie(1);
        item.requester = Some(Requester {
            user_id: Some(7),
            ..Requester::default()
        });
        assert_eq!(evaluate(&item, &ctx).deletion_date, None);

        item.requester = Some(Requester {
            user_id: Some(99),
            username: Some("nobody".to_string()),
            ..Requester::default()
        });
        assert_eq!(evaluate(&item, &ctx).rule_source, RuleSource::Global);

        item.requester = Some(Requester {
            username: Some("alice".to_string()),
            ..Requester::default()
        });
        assert_eq!(evaluate(&item, &ctx).deletion_date, Some(item.added_at + Duration::days(14)));

        item.requester = Some(Requester {
            email: Some("bob@EXAMPLE.com".to_string()),
            ..Requester::default()
        });
        assert_eq!(evaluate(&item, &ctx).deletion_date, Some(item.added_at + Duration::days(2)));

        item.requester = None;
        assert_eq!(evaluate(&item, &ctx).rule_source, RuleSource::Global);
    }

    #[test]
    fn test_user_override_can_require_watched() {
        let global = rules("90d", "90d");
        let advanced = vec![rule(
            "alice",
            "5d",
            false,
            RuleMatcher::User {
                users: vec![UserMatcher {
                    username: Some("alice".to_string()),
                    require_watched: Some(true),
                    ..UserMatcher::default()
                }],
            },
        )];
        let mut item = movie(30);
        item.requester = Some(Requester {
            username: Some("alice".to_string()),
            ..Requester::default()
        });

        assert_eq!(evaluate(&item, &ctx(&global, &advanced, true)).deletion_date, None);
    }
}
