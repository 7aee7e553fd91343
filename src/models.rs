use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============ Lookup Models ============

/// One response from the person lookup API.
///
/// Immutable once constructed; the payload is only kept for status 200.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    status: u16,
    payload: Option<Value>,
    request_id: String,
    message: String,
}

impl LookupResult {
    /// Creates a lookup result. A payload supplied with a non-200 status is dropped.
    pub fn new(
        status: u16,
        payload: Option<Value>,
        request_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            payload: if status == 200 { payload } else { None },
            request_id: request_id.into(),
            message: message.into(),
        }
    }

    /// Successful lookup carrying a person payload.
    pub fn success(payload: Value, request_id: impl Into<String>) -> Self {
        Self::new(200, Some(payload), request_id, status_description(200))
    }

    /// Non-200 lookup; the message defaults to the status description.
    pub fn failure(status: u16, request_id: impl Into<String>) -> Self {
        Self::new(status, None, request_id, status_description(status))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn outcome(&self) -> LookupOutcome {
        LookupOutcome::from_status(self.status)
    }
}

/// Classification of a lookup status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LookupOutcome {
    /// 200: payload is mapped and stored.
    Success,
    /// 202: accepted, result not ready yet.
    Pending,
    /// 403: rate limited or quota exceeded.
    RateLimited,
    /// 500
    ServerError,
    /// 400 and 422
    InvalidRequest,
    /// 404, 405, 410 and anything unmapped.
    TerminalFailure,
}

impl LookupOutcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => LookupOutcome::Success,
            202 => LookupOutcome::Pending,
            403 => LookupOutcome::RateLimited,
            500 => LookupOutcome::ServerError,
            400 | 422 => LookupOutcome::InvalidRequest,
            _ => LookupOutcome::TerminalFailure,
        }
    }

    /// True for outcomes that leave the ledger entry active.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            LookupOutcome::Pending
                | LookupOutcome::RateLimited
                | LookupOutcome::ServerError
                | LookupOutcome::InvalidRequest
        )
    }
}

/// Human-readable label for the status codes the person API documents.
pub fn status_description(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "ACCEPTED",
        400 => "BAD REQUEST",
        403 => "FORBIDDEN",
        404 => "NOT FOUND",
        405 => "METHOD NOT ALLOWED",
        410 => "GONE (ENDPOINT DEPRECATED)",
        422 => "INVALID REQUEST",
        500 => "SERVER ERROR",
        _ => "UNKNOWN STATUS",
    }
}

// ============ Ledger Models ============

/// One row of the failure ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Store-assigned identifier, increasing with insertion order.
    pub failure_id: i64,
    pub email: String,
    pub initial_status: u16,
    pub message: String,
    /// Correlation key used to find this entry again on retry.
    pub request_id: String,
    pub create_dt: DateTime<Utc>,
    pub retry_count: i64,
    pub most_recent_retry_status: Option<u16>,
    pub most_recent_retry_dt: Option<DateTime<Utc>>,
    /// Once true, never reverts.
    pub retry_complete: bool,
}

// ============ Record Drafts ============

/// Identity row, keyed by the email that was looked up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityDraft {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub match_likelihood: f64,
}

/// A deduced location component (city, county, state, country, continent).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationPart {
    pub name: Option<String>,
    pub code: Option<String>,
    pub is_deduced: Option<bool>,
}

impl LocationPart {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.code.is_none() && self.is_deduced.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressDraft {
    pub location_general: Option<String>,
    pub city: LocationPart,
    pub county: LocationPart,
    pub state: LocationPart,
    pub country: LocationPart,
    pub continent: LocationPart,
    pub address_likelihood: Option<f64>,
}

impl AddressDraft {
    /// True when no address field was present in the payload.
    pub fn is_empty(&self) -> bool {
        self.location_general.is_none()
            && self.city.is_empty()
            && self.county.is_empty()
            && self.state.is_empty()
            && self.country.is_empty()
            && self.continent.is_empty()
            && self.address_likelihood.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographyDraft {
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub age_range_min: Option<i64>,
    pub age_range_max: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDraft {
    pub name: Option<String>,
    pub title: Option<String>,
    /// Free text, nominally `yyyy-mm[-dd]`.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_current: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicDraft {
    pub provider: String,
    pub topic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDraft {
    pub provider: String,
    pub score_type: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Website,
    Social,
}

impl ProfileType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileType::Website => "website",
            ProfileType::Social => "social",
        }
    }
}

/// Website or social network profile; both share one record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub profile_type: ProfileType,
    pub network_id: Option<String>,
    pub network_name: Option<String>,
    pub profile_id: Option<String>,
    pub profile_url: Option<String>,
    pub user_name: Option<String>,
    pub user_bio: Option<String>,
    pub followers: Option<i64>,
    pub following: Option<i64>,
    pub user_feed: Option<String>,
}

impl ProfileDraft {
    pub fn website(url: Option<String>) -> Self {
        Self {
            profile_type: ProfileType::Website,
            network_id: Some("website".to_string()),
            network_name: Some("website".to_string()),
            profile_id: None,
            profile_url: url,
            user_name: None,
            user_bio: None,
            followers: None,
            following: None,
            user_feed: None,
        }
    }
}

/// Every record derived from one successful lookup payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBundle {
    pub identity: IdentityDraft,
    pub address: AddressDraft,
    pub demography: DemographyDraft,
    pub organizations: Vec<OrganizationDraft>,
    pub topics: Vec<TopicDraft>,
    pub scores: Vec<ScoreDraft>,
    pub profiles: Vec<ProfileDraft>,
}

impl RecordBundle {
    pub fn email(&self) -> &str {
        &self.identity.email
    }
}

// ============ Export Models ============

/// Denormalized identity view written to the user export CSV.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserExportRow {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub location: Option<String>,
    pub age: Option<i64>,
    pub age_range_min: Option<i64>,
    pub age_range_max: Option<i64>,
    pub klout_score: Option<f64>,
    pub facebook_id: Option<String>,
    pub facebook_username: Option<String>,
    pub facebook_profile: Option<String>,
    pub twitter_id: Option<String>,
    pub twitter_screen_name: Option<String>,
    pub twitter_followers: Option<i64>,
    pub twitter_following: Option<i64>,
    pub website: Option<String>,
    pub scraped_on: DateTime<Utc>,
}

impl UserExportRow {
    /// Projects a stored bundle onto the export view.
    pub fn from_bundle(user_id: i64, bundle: &RecordBundle, scraped_on: DateTime<Utc>) -> Self {
        let network = |name: &str| {
            bundle.profiles.iter().find(|p| {
                p.profile_type == ProfileType::Social && p.network_name.as_deref() == Some(name)
            })
        };
        let facebook = network("Facebook");
        let twitter = network("Twitter");
        let website = bundle
            .profiles
            .iter()
            .find(|p| p.profile_type == ProfileType::Website);
        let klout = bundle.scores.iter().find(|s| s.provider == "klout");

        Self {
            user_id,
            first_name: bundle.identity.first_name.clone(),
            last_name: bundle.identity.last_name.clone(),
            email: bundle.identity.email.clone(),
            location: bundle.address.location_general.clone(),
            age: bundle.demography.age,
            age_range_min: bundle.demography.age_range_min,
            age_range_max: bundle.demography.age_range_max,
            klout_score: klout.and_then(|s| s.value),
            facebook_id: facebook.and_then(|p| p.profile_id.clone()),
            facebook_username: facebook.and_then(|p| p.user_name.clone()),
            facebook_profile: facebook.and_then(|p| p.profile_url.clone()),
            twitter_id: twitter.and_then(|p| p.profile_id.clone()),
            twitter_screen_name: twitter.and_then(|p| p.user_name.clone()),
            twitter_followers: twitter.and_then(|p| p.followers),
            twitter_following: twitter.and_then(|p| p.following),
            website: website.and_then(|p| p.profile_url.clone()),
            scraped_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_classification() {
        assert_eq!(LookupOutcome::from_status(200), LookupOutcome::Success);
        assert_eq!(LookupOutcome::from_status(202), LookupOutcome::Pending);
        assert_eq!(LookupOutcome::from_status(403), LookupOutcome::RateLimited);
        assert_eq!(LookupOutcome::from_status(500), LookupOutcome::ServerError);
        assert_eq!(LookupOutcome::from_status(400), LookupOutcome::InvalidRequest);
        assert_eq!(LookupOutcome::from_status(422), LookupOutcome::InvalidRequest);
        for status in [404, 405, 410, 418, 0, 503] {
            assert_eq!(
                LookupOutcome::from_status(status),
                LookupOutcome::TerminalFailure,
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_only_transient_outcomes_are_retryable() {
        assert!(!LookupOutcome::Success.is_retryable());
        assert!(!LookupOutcome::TerminalFailure.is_retryable());
        assert!(LookupOutcome::Pending.is_retryable());
        assert!(LookupOutcome::RateLimited.is_retryable());
    }

    #[test]
    fn test_payload_dropped_for_non_success() {
        let result = LookupResult::new(202, Some(json!({"status": 202})), "req-1", "queued");
        assert!(result.payload().is_none());
        assert_eq!(result.request_id(), "req-1");
        assert_eq!(result.message(), "queued");

        let ok = LookupResult::success(json!({"likelihood": 0.9}), "req-2");
        assert_eq!(ok.status(), 200);
        assert!(ok.payload().is_some());
    }

    #[test]
    fn test_status_description_falls_back() {
        assert_eq!(status_description(410), "GONE (ENDPOINT DEPRECATED)");
        assert_eq!(status_description(999), "UNKNOWN STATUS");
    }

    #[test]
    fn test_export_row_picks_first_profile_per_network() {
        let mut bundle = RecordBundle::default();
        bundle.identity.email = "bart@example.com".to_string();
        bundle.profiles.push(ProfileDraft::website(Some("https://bart.dev".into())));
        let mut twitter = ProfileDraft::website(None);
        twitter.profile_type = ProfileType::Social;
        twitter.network_name = Some("Twitter".to_string());
        twitter.user_name = Some("bart".to_string());
        twitter.followers = Some(10);
        bundle.profiles.push(twitter.clone());
        twitter.user_name = Some("bart_alt".to_string());
        bundle.profiles.push(twitter);

        let row = UserExportRow::from_bundle(7, &bundle, Utc::now());
        assert_eq!(row.user_id, 7);
        assert_eq!(row.website.as_deref(), Some("https://bart.dev"));
        assert_eq!(row.twitter_screen_name.as_deref(), Some("bart"));
        assert_eq!(row.twitter_followers, Some(10));
        assert!(row.facebook_id.is_none());
        assert!(row.klout_score.is_none());
    }
}
