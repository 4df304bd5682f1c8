#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;

use firebase_rs_storage::app::{initialize_app, FirebaseApp, FirebaseAppSettings, FirebaseOptions};
use firebase_rs_storage::auth::auth_for_app;
use firebase_rs_storage::storage::{
    connect_storage_emulator, get_storage_for_app, EmulatorOptions, FieldUpdate, FirebaseStorageImpl,
    MockUserToken, SettableMetadata,
};
use httpmock::prelude::*;
use serde_json::json;

const BUCKET: &str = "demo-bucket";

fn emulated_storage(name: &str, server: &MockServer, options: Option<EmulatorOptions>) -> (FirebaseApp, Arc<FirebaseStorageImpl>) {
    let app = initialize_app(
        FirebaseOptions {
            api_key: Some("integration-key".into()),
            project_id: Some("demo-project".into()),
            storage_bucket: Some(BUCKET.into()),
            ..Default::default()
        },
        Some(FirebaseAppSettings {
            name: Some(name.into()),
            ..Default::default()
        }),
    )
    .expect("app");
    let storage = get_storage_for_app(Some(app.clone()), None).expect("storage");
    connect_storage_emulator(&storage, &server.host(), server.port(), options).expect("emulator");
    (app, storage)
}

fn object_resource(name: &str, content_type: &str) -> serde_json::Value {
    json!({
        "bucket": BUCKET,
        "name": name,
        "size": "11",
        "contentType": content_type,
        "generation": "1",
        "metageneration": "2",
        "downloadTokens": "token-a,token-b"
    })
}

#[tokio::test(flavor = "current_thread")]
async fn metadata_update_round_trips_through_emulator() {
    let server = MockServer::start_async().await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v0/b/{BUCKET}/o/notes.txt"))
                .header("Authorization", "Firebase owner-token");
            then.status(200).json_body(object_resource("notes.txt", "text/plain"));
        })
        .await;
    let patch = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path(format!("/v0/b/{BUCKET}/o/notes.txt"))
                .json_body(json!({"contentType": "text/markdown", "cacheControl": null}));
            then.status(200).json_body(object_resource("notes.txt", "text/markdown"));
        })
        .await;

    let options = EmulatorOptions {
        mock_user_token: Some(MockUserToken::Raw("owner-token".into())),
    };
    let (_app, storage) = emulated_storage("integration-metadata", &server, Some(options));
    let notes = storage.reference_from_path(Some("notes.txt")).expect("ref");

    let metadata = notes.get_metadata().await.expect("metadata");
    assert_eq!(metadata.size, 11);
    assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));

    let update = SettableMetadata {
        content_type: FieldUpdate::Set("text/markdown".into()),
        cache_control: FieldUpdate::Clear,
        ..Default::default()
    };
    let updated = notes.update_metadata(&update).await.expect("update");
    assert_eq!(updated.content_type.as_deref(), Some("text/markdown"));

    let url = notes.get_download_url().await.expect("download url");
    assert_eq!(
        url,
        format!("http://{}:{}/v0/b/{BUCKET}/o/notes.txt?alt=media&token=token-a", server.host(), server.port())
    );

    get.assert_hits_async(2).await;
    patch.assert_async().await;
}

#[tokio::test(flavor = "current_thread")]
async fn list_all_follows_page_tokens() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v0/b/{BUCKET}/o"))
                .query_param("prefix", "photos/")
                .query_param("delimiter", "/")
                .matches(|req| {
                    !req.query_params
                        .as_ref()
                        .is_some_and(|params| params.iter().any(|(key, _)| key == "pageToken"))
                });
            then.status(200).json_body(json!({
                "prefixes": ["photos/2023/"],
                "items": [{"name": "photos/a.jpg", "bucket": BUCKET}],
                "nextPageToken": "page-2"
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v0/b/{BUCKET}/o"))
                .query_param("pageToken", "page-2");
            then.status(200).json_body(json!({
                "items": [{"name": "photos/b.jpg", "bucket": BUCKET}]
            }));
        })
        .await;

    let (_app, storage) = emulated_storage("integration-list", &server, None);
    let photos = storage.reference_from_path(Some("photos")).expect("ref");
    let listing = photos.list_all().await.expect("list all");

    let items: Vec<String> = listing.items.iter().map(|item| item.full_path().to_string()).collect();
    assert_eq!(items, vec!["photos/a.jpg", "photos/b.jpg"]);
    assert_eq!(listing.prefixes.len(), 1);
    assert_eq!(listing.prefixes[0].full_path(), "photos/2023");
    assert!(listing.next_page_token.is_none());

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test(flavor = "current_thread")]
async fn missing_objects_map_to_object_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path(format!("/v0/b/{BUCKET}/o/gone.txt"));
            then.status(404).body("not found");
        })
        .await;

    let (_app, storage) = emulated_storage("integration-missing", &server, None);
    let gone = storage.reference_from_path(Some("gone.txt")).expect("ref");
    let err = gone.delete_object().await.unwrap_err();
    assert_eq!(err.code_str(), "storage/object-not-found");
}

#[tokio::test(flavor = "current_thread")]
async fn signed_in_user_token_authorizes_storage_requests() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/identitytoolkit.googleapis.com/v1/accounts:signInWithPassword")
                .query_param("key", "integration-key");
            then.status(200).json_body(json!({
                "localId": "uid-1",
                "email": "user@example.com",
                "idToken": "user-id-token",
                "refreshToken": "refresh",
                "expiresIn": "3600"
            }));
        })
        .await;
    let download = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v0/b/{BUCKET}/o/secret.bin"))
                .query_param("alt", "media")
                .header("Authorization", "Firebase user-id-token");
            then.status(200).body("payload");
        })
        .await;

    let (app, storage) = emulated_storage("integration-auth", &server, None);
    let auth = auth_for_app(Some(app)).expect("auth");
    auth.connect_auth_emulator(&server.host(), server.port())
        .expect("auth emulator");
    auth.sign_in_with_email_and_password("user@example.com", "secret")
        .await
        .expect("sign in");

    let secret = storage.reference_from_path(Some("secret.bin")).expect("ref");
    assert_eq!(secret.get_bytes(None).await.expect("bytes"), b"payload".to_vec());
    download.assert_async().await;
}
