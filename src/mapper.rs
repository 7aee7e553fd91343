//! Maps a successful person lookup payload onto normalized record drafts.

use crate::models::{
    AddressDraft, DemographyDraft, IdentityDraft, LocationPart, OrganizationDraft, ProfileDraft,
    ProfileType, RecordBundle, ScoreDraft, TopicDraft,
};
use crate::payload::{
    deep_get, deep_get_as, deep_get_list, deep_get_or, flatten_grouped, parse_age_range,
    FromPayload,
};
use serde_json::Value;

/// Pure mapping from payload to [`RecordBundle`]. Never fails on absent data.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordMapper;

impl RecordMapper {
    pub fn new() -> Self {
        Self
    }

    /// Builds every record for `email` from `payload`.
    pub fn map(&self, email: &str, payload: &Value) -> RecordBundle {
        RecordBundle {
            identity: map_identity(email, payload),
            address: map_address(payload),
            demography: map_demography(payload),
            organizations: map_organizations(payload),
            topics: map_topics(payload),
            scores: map_scores(payload),
            profiles: map_profiles(payload),
        }
    }
}

fn map_identity(email: &str, payload: &Value) -> IdentityDraft {
    IdentityDraft {
        email: email.to_string(),
        first_name: deep_get_as(payload, &["contactInfo", "givenName"]),
        last_name: deep_get_as(payload, &["contactInfo", "familyName"]),
        match_likelihood: deep_get_or(payload, &["likelihood"], 0.0),
    }
}

fn location_part(payload: &Value, part: &str, with_code: bool) -> LocationPart {
    let leaf = |key: &str| deep_get(payload, &["demographics", "locationDeduced", part, key]);
    LocationPart {
        name: leaf("name").and_then(String::from_payload),
        code: if with_code {
            leaf("code").and_then(String::from_payload)
        } else {
            None
        },
        is_deduced: leaf("deduced").and_then(bool::from_payload),
    }
}

fn map_address(payload: &Value) -> AddressDraft {
    AddressDraft {
        location_general: deep_get_as(payload, &["demographics", "locationGeneral"]),
        city: location_part(payload, "city", false),
        county: location_part(payload, "county", false),
        state: location_part(payload, "state", true),
        country: location_part(payload, "country", true),
        continent: location_part(payload, "continent", false),
        address_likelihood: deep_get_as(
            payload,
            &["demographics", "locationDeduced", "likelihood"],
        ),
    }
}

fn map_demography(payload: &Value) -> DemographyDraft {
    let age_range: Option<String> = deep_get_as(payload, &["demographics", "ageRange"]);
    let (age_range_min, age_range_max) = parse_age_range(age_range.as_deref());

    DemographyDraft {
        gender: deep_get_as(payload, &["demographics", "gender"]),
        age: deep_get_as(payload, &["demographics", "age"]),
        age_range_min,
        age_range_max,
    }
}

fn map_organizations(payload: &Value) -> Vec<OrganizationDraft> {
    deep_get_list(payload, &["organizations"])
        .iter()
        .filter(|org| org.is_object())
        .map(|org| OrganizationDraft {
            name: deep_get_as(org, &["name"]),
            title: deep_get_as(org, &["title"]),
            start_date: deep_get_as(org, &["startDate"]),
            end_date: deep_get_as(org, &["endDate"]),
            is_current: deep_get_or(org, &["current"], false),
            is_primary: deep_get_or(org, &["isPrimary"], false),
        })
        .collect()
}

fn map_topics(payload: &Value) -> Vec<TopicDraft> {
    flatten_grouped(deep_get(payload, &["digitalFootprint", "topics"]))
        .into_iter()
        .filter_map(|topic| {
            // A topic row without a label carries nothing worth storing.
            let label: String = deep_get_as(topic, &["value"])?;
            Some(TopicDraft {
                provider: deep_get_or(topic, &["provider"], String::new()),
                topic: label,
            })
        })
        .collect()
}

fn map_scores(payload: &Value) -> Vec<ScoreDraft> {
    flatten_grouped(deep_get(payload, &["digitalFootprint", "scores"]))
        .into_iter()
        .filter(|score| score.is_object())
        .map(|score| ScoreDraft {
            provider: deep_get_or(score, &["provider"], String::new()),
            score_type: deep_get_or(score, &["type"], String::new()),
            value: deep_get_as(score, &["value"]),
        })
        .collect()
}

fn map_profiles(payload: &Value) -> Vec<ProfileDraft> {
    let websites = deep_get_list(payload, &["contactInfo", "websites"])
        .iter()
        .filter(|web| web.is_object())
        .map(|web| ProfileDraft::website(deep_get_as(web, &["url"])));

    let social = flatten_grouped(deep_get(payload, &["socialProfiles"]))
        .into_iter()
        .filter(|profile| profile.is_object())
        .map(map_social_profile);

    websites.chain(social).collect()
}

fn map_social_profile(profile: &Value) -> ProfileDraft {
    ProfileDraft {
        profile_type: ProfileType::Social,
        network_id: deep_get_as(profile, &["typeId"]),
        network_name: deep_get_as(profile, &["typeName"]),
        profile_id: deep_get_as(profile, &["id"]),
        profile_url: deep_get_as(profile, &["url"]),
        user_name: deep_get_as(profile, &["username"]),
        user_bio: deep_get_as(profile, &["bio"]),
        followers: deep_get_as(profile, &["followers"]),
        following: deep_get_as(profile, &["following"]),
        user_feed: deep_get_as(profile, &["rss"]),
    }
}
