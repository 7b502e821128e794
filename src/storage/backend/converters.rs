use std::str::FromStr;

use sea_orm::ActiveValue::{NotSet, Set};

use crate::errors::{DeeplinkError, Result};
use crate::storage::models::{
    AttributionLink, ClickEvent, FraudFlag, Link, MatchConfidence, OpenEvent, Platform,
    ResolutionOutcome,
};
use migration::entities::{attribution_link, click_event, fraud_flag, link, open_event};

fn parse_enum<T: FromStr>(column: &str, raw: &str) -> Result<T> {
    T::from_str(raw).map_err(|_| {
        DeeplinkError::serialization(format!("列 {} 含有无法识别的值: {}", column, raw))
    })
}

pub fn model_to_click(model: click_event::Model) -> Result<ClickEvent> {
    Ok(ClickEvent {
        platform: parse_enum::<Platform>("click_events.platform", &model.platform)?,
        outcome: parse_enum::<ResolutionOutcome>("click_events.outcome", &model.outcome)?,
        id: model.id,
        dedup_key: model.dedup_key,
        link_id: model.link_id,
        browser: model.browser,
        user_agent: model.user_agent,
        ip_address: model.ip_address,
        country: model.country,
        state: model.state,
        city: model.city,
        fingerprint: model.fingerprint,
        deep_path: model.deep_path,
        classifier_degraded: model.classifier_degraded,
        created_at: model.created_at,
    })
}

pub fn click_to_active_model(event: &ClickEvent) -> click_event::ActiveModel {
    click_event::ActiveModel {
        id: Set(event.id.clone()),
        dedup_key: Set(event.dedup_key.clone()),
        link_id: Set(event.link_id.clone()),
        platform: Set(event.platform.as_ref().to_string()),
        browser: Set(event.browser.clone()),
        user_agent: Set(event.user_agent.clone()),
        ip_address: Set(event.ip_address.clone()),
        country: Set(event.country.clone()),
        state: Set(event.state.clone()),
        city: Set(event.city.clone()),
        fingerprint: Set(event.fingerprint.clone()),
        outcome: Set(event.outcome.as_ref().to_string()),
        deep_path: Set(event.deep_path.clone()),
        classifier_degraded: Set(event.classifier_degraded),
        created_at: Set(event.created_at),
    }
}

pub fn model_to_open(model: open_event::Model) -> Result<OpenEvent> {
    Ok(OpenEvent {
        platform: parse_enum::<Platform>("open_events.platform", &model.platform)?,
        id: model.id,
        dedup_key: model.dedup_key,
        device_id: model.device_id,
        os_version: model.os_version,
        browser: model.browser,
        user_agent: model.user_agent,
        ip_address: model.ip_address,
        country: model.country,
        state: model.state,
        city: model.city,
        fingerprint: model.fingerprint,
        deep_path: model.deep_path,
        success: model.success,
        classifier_degraded: model.classifier_degraded,
        created_at: model.created_at,
    })
}

pub fn open_to_active_model(event: &OpenEvent) -> open_event::ActiveModel {
    open_event::ActiveModel {
        id: Set(event.id.clone()),
        dedup_key: Set(event.dedup_key.clone()),
        device_id: Set(event.device_id.clone()),
        platform: Set(event.platform.as_ref().to_string()),
        os_version: Set(event.os_version.clone()),
        browser: Set(event.browser.clone()),
        user_agent: Set(event.user_agent.clone()),
        ip_address: Set(event.ip_address.clone()),
        country: Set(event.country.clone()),
        state: Set(event.state.clone()),
        city: Set(event.city.clone()),
        fingerprint: Set(event.fingerprint.clone()),
        deep_path: Set(event.deep_path.clone()),
        success: Set(event.success),
        classifier_degraded: Set(event.classifier_degraded),
        created_at: Set(event.created_at),
    }
}

pub fn model_to_attribution(model: attribution_link::Model) -> Result<AttributionLink> {
    Ok(AttributionLink {
        match_confidence: parse_enum::<MatchConfidence>(
            "attribution_links.match_confidence",
            &model.match_confidence,
        )?,
        open_event_id: model.open_event_id,
        click_event_id: model.click_event_id,
        confidence_score: model.confidence_score,
        matched_at: model.matched_at,
        window_expired: model.window_expired,
        fraud_excluded: model.fraud_excluded,
        link_id: model.link_id,
        campaign: model.campaign,
        source: model.source,
    })
}

pub fn attribution_to_active_model(link: &AttributionLink) -> attribution_link::ActiveModel {
    attribution_link::ActiveModel {
        open_event_id: Set(link.open_event_id.clone()),
        click_event_id: Set(link.click_event_id.clone()),
        match_confidence: Set(link.match_confidence.as_ref().to_string()),
        confidence_score: Set(link.confidence_score),
        window_expired: Set(link.window_expired),
        fraud_excluded: Set(link.fraud_excluded),
        link_id: Set(link.link_id.clone()),
        campaign: Set(link.campaign.clone()),
        source: Set(link.source.clone()),
        matched_at: Set(link.matched_at),
    }
}

pub fn model_to_fraud_flag(model: fraud_flag::Model) -> FraudFlag {
    FraudFlag {
        fingerprint: model.fingerprint,
        first_click_at: model.first_click_at,
        last_click_at: model.last_click_at,
        click_count: model.click_count.max(0) as u64,
        flagged_at: model.flagged_at,
    }
}

pub fn fraud_flag_to_active_model(flag: &FraudFlag) -> fraud_flag::ActiveModel {
    fraud_flag::ActiveModel {
        id: NotSet,
        fingerprint: Set(flag.fingerprint.clone()),
        first_click_at: Set(flag.first_click_at),
        last_click_at: Set(flag.last_click_at),
        click_count: Set(flag.click_count as i64),
        flagged_at: Set(flag.flagged_at),
    }
}

pub fn model_to_link(model: link::Model) -> Link {
    Link {
        id: model.id,
        web_url: model.web_url,
        ios_store_url: model.ios_store_url,
        android_store_url: model.android_store_url,
        ios_app_url: model.ios_app_url,
        android_app_url: model.android_app_url,
        deep_path: model.deep_path,
        campaign: model.campaign,
        source: model.source,
        created_at: model.created_at,
    }
}

pub fn link_to_active_model(link: &Link) -> link::ActiveModel {
    link::ActiveModel {
        id: Set(link.id.clone()),
        web_url: Set(link.web_url.clone()),
        ios_store_url: Set(link.ios_store_url.clone()),
        android_store_url: Set(link.android_store_url.clone()),
        ios_app_url: Set(link.ios_app_url.clone()),
        android_app_url: Set(link.android_app_url.clone()),
        deep_path: Set(link.deep_path.clone()),
        campaign: Set(link.campaign.clone()),
        source: Set(link.source.clone()),
        created_at: Set(link.created_at),
    }
}
