#![allow(clippy::unwrap_used, clippy::expect_used)]
mod common;

use {
    common::{Harness, PROVIDER_PHOTO_400, fresh, returning, uid},
    quill_config::{NewUserDetection, QuillConfig},
    quill_identity::{IdentityProvider, SignInOutcome},
    quill_onboarding::{Error, ImageUpload, KeyValueStore, Stage},
};

fn flag(h: &Harness, key: &str) -> Option<String> {
    h.kv.get(key)
}

#[tokio::test]
async fn fresh_account_lands_on_profile_completion() {
    let h = Harness::new();
    h.script(fresh("alice").with_avatar_url(common::PROVIDER_PHOTO));

    assert_eq!(h.service.sign_in().await.unwrap(), Stage::ProfileCompletion);
    assert_eq!(h.path(), "/profile-completion");
    assert_eq!(
        flag(&h, "user_alice_profile_completed").as_deref(),
        Some("false")
    );
    assert_eq!(
        flag(&h, "user_alice_topics_selected").as_deref(),
        Some("false")
    );
    let current = h.service.current_user().unwrap();
    assert_eq!(current.uid, "alice");
    assert_eq!(current.created_at, current.last_login);
}

#[tokio::test]
async fn profile_done_topics_pending_goes_to_topic_selection() {
    let h = Harness::new();
    h.preset_flags("bob", true, false);
    h.script(returning("bob"));

    assert_eq!(h.service.sign_in().await.unwrap(), Stage::TopicSelection);
    assert_eq!(h.path(), "/topics-selection");
}

#[tokio::test]
async fn fully_onboarded_user_goes_to_dashboard() {
    let h = Harness::new();
    h.preset_flags("carol", true, true);
    h.script(returning("carol"));

    assert_eq!(h.service.sign_in().await.unwrap(), Stage::Dashboard);
    assert_eq!(h.path(), "/dashboard");
}

#[tokio::test]
async fn returning_user_without_progress_is_not_auto_completed() {
    let h = Harness::new();
    h.script(returning("dave"));

    assert_eq!(h.service.sign_in().await.unwrap(), Stage::ProfileCompletion);
    assert_eq!(
        flag(&h, "user_dave_profile_completed").as_deref(),
        Some("false")
    );
}

#[tokio::test]
async fn too_few_topics_changes_nothing() {
    let h = Harness::new();
    h.preset_flags("erin", true, false);
    h.script(returning("erin"));
    h.service.sign_in().await.unwrap();

    let err = h.service.commit_topics(["Python", "Books"]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput { field: "topics", .. }));
    assert_eq!(
        flag(&h, "user_erin_topics_selected").as_deref(),
        Some("false")
    );
    assert!(flag(&h, "user_erin_topics").is_none());
    assert!(h.remote.topics(&uid("erin")).is_none());
    assert_eq!(h.service.current_stage(), Stage::TopicSelection);
}

#[tokio::test]
async fn configured_minimum_applies() {
    let mut config = QuillConfig::default();
    config.onboarding.min_topics = 5;
    let h = Harness::with_config(config);
    h.preset_flags("fay", true, false);
    h.script(returning("fay"));
    h.service.sign_in().await.unwrap();

    assert!(
        h.service
            .commit_topics(["Python", "Books", "UX", "Design"])
            .await
            .is_err()
    );
    assert_eq!(
        h.service
            .commit_topics(["Python", "Books", "UX", "Design", "Health"])
            .await
            .unwrap(),
        Stage::Dashboard
    );
}

#[tokio::test]
async fn failed_remote_write_keeps_flag_and_resubmission_succeeds() {
    let h = Harness::new();
    h.script(fresh("gus").with_avatar_url(common::PROVIDER_PHOTO));
    h.service.sign_in().await.unwrap();

    let mut draft = h.service.start_profile().unwrap();
    draft.full_name = "Gus Grissom".into();

    h.remote.fail_next_write("network unreachable");
    let err = h.service.commit_profile(&draft).await.unwrap_err();
    assert!(matches!(err, Error::RemoteWriteFailed { .. }));
    assert!(err.is_retryable());
    assert_eq!(
        flag(&h, "user_gus_profile_completed").as_deref(),
        Some("false")
    );
    assert!(flag(&h, "user_gus_profile_data").is_none());
    assert_eq!(h.service.current_stage(), Stage::ProfileCompletion);

    assert_eq!(
        h.service.commit_profile(&draft).await.unwrap(),
        Stage::TopicSelection
    );
    assert_eq!(
        flag(&h, "user_gus_profile_completed").as_deref(),
        Some("true")
    );
    assert_eq!(h.path(), "/topics-selection");
}

#[tokio::test]
async fn failed_identity_update_keeps_flag() {
    let h = Harness::new();
    h.script(fresh("hal").with_avatar_url(common::PROVIDER_PHOTO));
    h.service.sign_in().await.unwrap();

    let mut draft = h.service.start_profile().unwrap();
    draft.full_name = "Hal Jordan".into();
    h.identity
        .fail_next_update(quill_identity::Error::remote_write("quota exceeded"));

    let err = h.service.commit_profile(&draft).await.unwrap_err();
    assert!(matches!(err, Error::RemoteWriteFailed { .. }));
    assert_eq!(h.service.current_stage(), Stage::ProfileCompletion);

    h.service.commit_profile(&draft).await.unwrap();
    assert_eq!(
        h.identity.record(&uid("hal")).unwrap().display_name.as_deref(),
        Some("Hal Jordan")
    );
}

#[tokio::test]
async fn committed_profile_is_visible_immediately() {
    let h = Harness::new();
    h.script(fresh("ivy").with_avatar_url(common::PROVIDER_PHOTO));
    h.service.sign_in().await.unwrap();

    let mut draft = h.service.start_profile().unwrap();
    draft.full_name = "  Ivy Lee ".into();
    h.service.commit_profile(&draft).await.unwrap();
    assert_eq!(h.service.current_stage(), Stage::TopicSelection);

    let doc = h.remote.profile(&uid("ivy")).unwrap();
    assert_eq!(doc.full_name, "Ivy Lee");
    assert_eq!(doc.profile_image, PROVIDER_PHOTO_400);
    assert!(doc.from_google);

    let cached: serde_json::Value =
        serde_json::from_str(&flag(&h, "user_ivy_profile_data").unwrap()).unwrap();
    assert_eq!(cached["fullName"], "Ivy Lee");
    assert_eq!(cached["profileImage"], PROVIDER_PHOTO_400);
    assert_eq!(cached["fromGoogle"], true);

    let stage = h
        .service
        .commit_topics(["machine learning", "Books", "ux", "Books"])
        .await
        .unwrap();
    assert_eq!(stage, Stage::Dashboard);
    assert_eq!(h.service.current_stage(), Stage::Dashboard);
    assert_eq!(
        flag(&h, "user_ivy_topics").as_deref(),
        Some(r#"["Books","Machine Learning","UX"]"#)
    );
    assert_eq!(h.remote.topics(&uid("ivy")).unwrap().topics.len(), 3);
}

#[tokio::test]
async fn invalid_name_is_rejected_without_writes() {
    let h = Harness::new();
    h.script(fresh("jo").with_avatar_url(common::PROVIDER_PHOTO));
    h.service.sign_in().await.unwrap();

    let mut draft = h.service.start_profile().unwrap();
    draft.full_name = " J ".into();
    let err = h.service.commit_profile(&draft).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput {
        field: "full_name",
        ..
    }));
    assert_eq!(h.remote.write_count(), 0);
}

#[tokio::test]
async fn custom_upload_stays_local() {
    let h = Harness::new();
    h.script(fresh("kim").with_avatar_url(common::PROVIDER_PHOTO));
    h.service.sign_in().await.unwrap();

    let mut draft = h.service.start_profile().unwrap();
    draft.full_name = "Kim Possible".into();
    draft
        .upload(ImageUpload::new("image/png", vec![0x89, 0x50, 0x4e, 0x47]))
        .unwrap();
    h.service.commit_profile(&draft).await.unwrap();

    let doc = h.remote.profile(&uid("kim")).unwrap();
    assert!(doc.profile_image.starts_with("data:image/png;base64,"));
    let record = h.identity.record(&uid("kim")).unwrap();
    assert_eq!(record.avatar_url.as_deref(), Some(PROVIDER_PHOTO_400));
    assert_eq!(record.display_name.as_deref(), Some("Kim Possible"));

    // Reopening the form keeps the upload.
    let reopened = h.service.start_profile().unwrap();
    assert!(reopened.image().is_custom_upload());
    assert_eq!(reopened.full_name, "Kim Possible");
}

#[tokio::test]
async fn lost_session_sends_visitor_home() {
    let h = Harness::new();
    h.script(fresh("lou").with_avatar_url(common::PROVIDER_PHOTO));
    h.service.sign_in().await.unwrap();
    let mut draft = h.service.start_profile().unwrap();
    draft.full_name = "Lou Reed".into();

    h.identity.expire_session();
    let err = h.service.commit_profile(&draft).await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
    assert_eq!(h.path(), "/");
    assert_eq!(
        flag(&h, "user_lou_profile_completed").as_deref(),
        Some("false")
    );

    let err = h
        .service
        .commit_topics(["Python", "Books", "UX"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn sign_out_keeps_onboarding_progress() {
    let h = Harness::new();
    h.preset_flags("max", true, true);
    h.script(returning("max"));
    h.service.sign_in().await.unwrap();

    assert_eq!(h.service.sign_out().await.unwrap(), Stage::AnonymousLanding);
    assert_eq!(h.path(), "/");
    assert!(h.service.current_user().is_none());
    assert!(h.identity.current().is_none());
    assert_eq!(
        flag(&h, "user_max_topics_selected").as_deref(),
        Some("true")
    );
    assert!(flag(&h, "user_max").is_some());

    h.script(returning("max"));
    assert_eq!(h.service.sign_in().await.unwrap(), Stage::Dashboard);
}

#[tokio::test]
async fn failed_sign_in_does_not_route() {
    let h = Harness::new();
    h.identity.enqueue_sign_in(SignInOutcome::Cancelled);
    h.identity
        .enqueue_sign_in(SignInOutcome::ProviderError("popup blocked".into()));

    assert!(matches!(
        h.service.sign_in().await.unwrap_err(),
        Error::AuthCancelled
    ));
    assert!(matches!(
        h.service.sign_in().await.unwrap_err(),
        Error::AuthProviderError { .. }
    ));
    assert!(h.nav.redirects().is_empty());
    assert_eq!(h.service.current_stage(), Stage::AnonymousLanding);
}

#[tokio::test]
async fn flags_absent_detection_refreshes_snapshot() {
    let mut config = QuillConfig::default();
    config.onboarding.new_user_detection = NewUserDetection::FlagsAbsent;
    let h = Harness::with_config(config);
    h.kv.set("user_nia", r#"{"uid":"nia","createdAt":"2020-01-01T00:00:00Z"}"#)
        .unwrap();
    h.script(returning("nia"));
    h.service.sign_in().await.unwrap();

    let snapshot = h.service.current_user().unwrap();
    assert_eq!(snapshot.display_name, "Returning User");
    assert_ne!(snapshot.created_at.unwrap().to_rfc3339(), "2020-01-01T00:00:00+00:00");
}

#[tokio::test]
async fn empty_selection_never_completes_topics() {
    let mut config = QuillConfig::default();
    config.onboarding.min_topics = 0;
    let h = Harness::with_config(config);
    h.preset_flags("oz", true, false);
    h.script(returning("oz"));
    h.service.sign_in().await.unwrap();

    let none: [&str; 0] = [];
    assert!(matches!(
        h.service.commit_topics(none).await.unwrap_err(),
        Error::InvalidInput { field: "topics", .. }
    ));
    assert_eq!(
        flag(&h, "user_oz_topics_selected").as_deref(),
        Some("false")
    );
    assert_eq!(h.service.current_stage(), Stage::TopicSelection);
}
