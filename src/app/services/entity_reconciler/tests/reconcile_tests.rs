//! Tests for the create / reuse / update protocol

use super::*;
use crate::Error;
use crate::app::adapters::http::Method;
use crate::app::services::entity_reconciler::{EntityKind, LocalEntity, ReconcileOutcome};

fn local_thing() -> LocalEntity {
    LocalEntity::new(
        EntityKind::Thing,
        object(json!({
            "name": "Alpha Ridge",
            "description": "Ridge weather station",
            "properties": {"provider": "test-provider"}
        })),
    )
}

#[tokio::test]
async fn test_creates_when_nothing_matches() {
    let (transport, reconciler) = create_reconciler();
    transport
        .respond(query_response(vec![]))
        .respond(HttpResponse::new(201).with_json(&remote_record(
            "Things",
            1,
            json!({"name": "Alpha Ridge"}),
        )));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Created(RemoteRef {
            id: json!(1),
            self_link: format!("{}/Things(1)", BASE_URL),
        })
    );
    assert_eq!(transport.methods(), vec![Method::Get, Method::Post]);

    let requests = transport.requests();
    assert_eq!(requests[0].url, format!("{}/Things", BASE_URL));
    assert_eq!(
        requests[0].query,
        vec![(
            "$filter".to_string(),
            "name eq 'Alpha Ridge' and description eq 'Ridge weather station'".to_string()
        )]
    );
    assert_eq!(
        requests[1].json.as_ref().unwrap()["properties"]["provider"],
        json!("test-provider")
    );
}

#[tokio::test]
async fn test_create_with_empty_body_follows_location_header() {
    let (transport, reconciler) = create_reconciler();
    let location = format!("{}/Things(9)", BASE_URL);
    transport
        .respond(query_response(vec![]))
        .respond(HttpResponse::new(201).with_header("Location", location.clone()))
        .respond(HttpResponse::new(200).with_json(&remote_record(
            "Things",
            9,
            json!({"name": "Alpha Ridge"}),
        )));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Created(_)));
    assert_eq!(outcome.remote().id, json!(9));
    assert_eq!(outcome.remote().self_link, location);
    assert_eq!(
        transport.methods(),
        vec![Method::Get, Method::Post, Method::Get]
    );
    assert_eq!(transport.requests()[2].url, location);
}

#[tokio::test]
async fn test_location_follow_up_without_body_uses_link_identifier() {
    let (transport, reconciler) = create_reconciler();
    transport
        .respond(query_response(vec![]))
        .respond(HttpResponse::new(201).with_header("Location", format!("{}/Things(12)", BASE_URL)))
        .respond(HttpResponse::new(200));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();
    assert_eq!(outcome.remote().id, json!(12));
}

#[tokio::test]
async fn test_create_without_identifier_or_location_fails() {
    let (transport, reconciler) = create_reconciler();
    transport
        .respond(query_response(vec![]))
        .respond(HttpResponse::new(201));

    let err = reconciler.reconcile(&local_thing()).await.unwrap_err();
    assert!(matches!(err, Error::RemoteProtocol { status: 201, .. }));
}

#[tokio::test]
async fn test_reuses_identical_record_without_writing() {
    let (transport, reconciler) = create_reconciler();
    transport.respond(query_response(vec![remote_record(
        "Things",
        4,
        json!({
            "description": "Ridge weather station",
            "name": "Alpha Ridge",
            "properties": {"provider": "test-provider"}
        }),
    )]));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Reused(_)));
    assert!(!outcome.wrote());
    assert_eq!(outcome.remote().id, json!(4));
    assert_eq!(transport.count(Method::Post), 0);
    assert_eq!(transport.count(Method::Patch), 0);
}

#[tokio::test]
async fn test_updates_differing_record_exactly_once() {
    let (transport, reconciler) = create_reconciler();
    transport
        .respond(query_response(vec![
            remote_record(
                "Things",
                4,
                json!({
                    "name": "Alpha Ridge",
                    "description": "Ridge weather station",
                    "properties": {"provider": "old-provider"}
                }),
            ),
            remote_record("Things", 8, json!({"name": "Alpha Ridge"})),
        ]))
        .respond(HttpResponse::new(200));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Updated(_)));
    assert_eq!(transport.count(Method::Patch), 1);
    assert_eq!(transport.count(Method::Post), 0);

    let patch = &transport.requests()[1];
    assert_eq!(patch.url, format!("{}/Things(4)", BASE_URL));
    assert_eq!(
        patch.json.as_ref().unwrap()["properties"]["provider"],
        json!("test-provider")
    );
}

#[tokio::test]
async fn test_update_accepts_no_content() {
    let (transport, reconciler) = create_reconciler();
    transport
        .respond(query_response(vec![remote_record(
            "Things",
            4,
            json!({"name": "Alpha Ridge", "description": "Ridge weather station"}),
        )]))
        .respond(HttpResponse::new(204));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Updated(_)));
}

#[tokio::test]
async fn test_location_mismatch_creates_instead_of_patching() {
    let (transport, reconciler) = create_reconciler();
    let location = LocalEntity::new(
        EntityKind::Location,
        object(json!({
            "name": "Alpha Ridge",
            "description": "Ridge weather station",
            "encodingType": "application/geo+json",
            "location": {"type": "Point", "coordinates": [-1.5, 51.5]}
        })),
    )
    .under(thing_ref(5));

    transport
        .respond(query_response(vec![remote_record(
            "Locations",
            2,
            json!({
                "name": "Alpha Ridge",
                "description": "Ridge weather station",
                "location": {"type": "Point", "coordinates": [-1.0, 51.0]}
            }),
        )]))
        .respond(HttpResponse::new(201).with_json(&remote_record(
            "Locations",
            3,
            json!({"name": "Alpha Ridge"}),
        )));

    let outcome = reconciler.reconcile(&location).await.unwrap();

    assert_eq!(outcome.remote().id, json!(3));
    assert!(matches!(outcome, ReconcileOutcome::Created(_)));
    assert_eq!(transport.count(Method::Patch), 0);

    let requests = transport.requests();
    assert_eq!(requests[0].url, format!("{}/Things(5)/Locations", BASE_URL));
    assert_eq!(requests[1].url, format!("{}/Things(5)/Locations", BASE_URL));
}

#[tokio::test]
async fn test_location_reuses_any_identical_match() {
    let (transport, reconciler) = create_reconciler();
    let location = LocalEntity::new(
        EntityKind::Location,
        object(json!({
            "name": "Alpha Ridge",
            "description": "Ridge weather station",
            "location": {"type": "Point", "coordinates": [-1.5, 51.5]}
        })),
    )
    .under(thing_ref(5));

    transport.respond(query_response(vec![
        remote_record(
            "Locations",
            2,
            json!({
                "name": "Alpha Ridge",
                "description": "Ridge weather station",
                "location": {"type": "Point", "coordinates": [-1.0, 51.0]}
            }),
        ),
        remote_record(
            "Locations",
            3,
            json!({
                "name": "Alpha Ridge",
                "description": "Ridge weather station",
                "location": {"type": "Point", "coordinates": [-1.5, 51.5]}
            }),
        ),
    ]));

    let outcome = reconciler.reconcile(&location).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Reused(_)));
    assert_eq!(outcome.remote().id, json!(3));
    assert_eq!(transport.methods(), vec![Method::Get]);
}

#[tokio::test]
async fn test_nested_kind_without_parent_is_rejected() {
    let (transport, reconciler) = create_reconciler();
    let datastream = LocalEntity::new(
        EntityKind::Datastream,
        object(json!({"name": "temp", "description": "Air temperature"})),
    );

    let err = reconciler.reconcile(&datastream).await.unwrap_err();

    assert!(matches!(err, Error::MissingRemoteLink { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_unexpected_create_status_is_fatal() {
    let (transport, reconciler) = create_reconciler();
    transport
        .respond(query_response(vec![]))
        .respond(HttpResponse::new(500).with_body("database unavailable"));

    let err = reconciler.reconcile(&local_thing()).await.unwrap_err();

    match err {
        Error::RemoteProtocol {
            method,
            status,
            body,
            ..
        } => {
            assert_eq!(method, "POST");
            assert_eq!(status, 500);
            assert!(body.contains("database unavailable"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_failed_query_is_fatal() {
    let (transport, reconciler) = create_reconciler();
    transport.respond(HttpResponse::new(400).with_body("bad filter"));

    let err = reconciler.reconcile(&local_thing()).await.unwrap_err();
    assert!(matches!(err, Error::RemoteProtocol { status: 400, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_transport_failure_is_retryable() {
    let (transport, reconciler) = create_reconciler();
    transport.fail(Error::transport(BASE_URL, "connection reset"));

    let err = reconciler.reconcile(&local_thing()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_observation_reused_across_number_representations() {
    let (transport, reconciler) = create_reconciler();
    let datastream = RemoteRef {
        id: json!(21),
        self_link: format!("{}/Datastreams(21)", BASE_URL),
    };
    let observation = LocalEntity::new(
        EntityKind::Observation,
        object(json!({"phenomenonTime": "2020-01-01T00:00:00Z", "result": 2})),
    )
    .under(datastream);

    transport.respond(query_response(vec![remote_record(
        "Observations",
        70,
        json!({"phenomenonTime": "2020-01-01T00:00:00.000Z", "result": 2.0}),
    )]));

    let outcome = reconciler.reconcile(&observation).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Reused(_)));
    assert_eq!(
        transport.requests()[0].url,
        format!("{}/Datastreams(21)/Observations", BASE_URL)
    );
}

#[tokio::test]
async fn test_missing_self_link_is_derived_from_collection() {
    let (transport, reconciler) = create_reconciler();
    transport.respond(query_response(vec![json!({
        "@iot.id": 6,
        "name": "Alpha Ridge",
        "description": "Ridge weather station",
        "properties": {"provider": "test-provider"}
    })]));

    let outcome = reconciler.reconcile(&local_thing()).await.unwrap();
    assert_eq!(outcome.remote().self_link, format!("{}/Things(6)", BASE_URL));
}
