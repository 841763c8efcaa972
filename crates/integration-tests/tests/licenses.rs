//! Team license roster behaviour over HTTP.

#![allow(clippy::unwrap_used)]

use insider_integration_tests::TestContext;
use reqwest::StatusCode;
use serde_json::{Value, json};

/// The listed license with `id`, from the point of view of `token`.
async fn listed(ctx: &TestContext, token: &str, id: i64) -> Option<Value> {
    ctx.licenses(token)
        .await
        .into_iter()
        .find(|l| l["id"].as_i64() == Some(id))
}

#[tokio::test]
async fn test_team_capacity_scenario() {
    let ctx = TestContext::spawn_with(|config| config.licenses.team_max_size = 5).await;
    let owner = ctx.signup("a@team.com").await;
    for email in ["b", "c", "d", "e", "f"] {
        ctx.signup(&format!("{email}@team.com")).await;
    }

    let license = ctx.activate(&owner, "team").await;

    for email in ["b@team.com", "c@team.com", "d@team.com", "e@team.com"] {
        let (status, body) = ctx.add_member(&owner, license, email).await;
        assert_eq!(status, StatusCode::OK, "{email}: {body}");
        assert_eq!(
            body["message"],
            "Great! The new team member has been added successfully."
        );
    }

    let (status, body) = ctx.add_member(&owner, license, "f@team.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Your team is full!"));

    let view = listed(&ctx, &owner, license).await.unwrap();
    assert_eq!(view["teamMembers"].as_array().unwrap().len(), 5);
    assert_eq!(view["availableTeamSlots"], 0);

    let (status, _) = ctx.remove_member(&owner, license, "b@team.com").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx.add_member(&owner, license, "f@team.com").await;
    assert_eq!(status, StatusCode::OK);

    let view = listed(&ctx, &owner, license).await.unwrap();
    let emails: Vec<&str> = view["teamMembers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails.len(), 5);
    assert!(emails.contains(&"f@team.com"));
    assert!(!emails.contains(&"b@team.com"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_respect_capacity() {
    let ctx = TestContext::spawn_with(|config| config.licenses.team_max_size = 5).await;
    let owner = ctx.signup("owner@race.com").await;
    let emails: Vec<String> = (0..8).map(|i| format!("m{i}@race.com")).collect();
    let mut tokens = Vec::new();
    for email in &emails {
        tokens.push(ctx.signup(email).await);
    }
    let license = ctx.activate(&owner, "team").await;

    let (r0, r1, r2, r3, r4, r5, r6, r7) = tokio::join!(
        ctx.add_member(&owner, license, &emails[0]),
        ctx.add_member(&owner, license, &emails[1]),
        ctx.add_member(&owner, license, &emails[2]),
        ctx.add_member(&owner, license, &emails[3]),
        ctx.add_member(&owner, license, &emails[4]),
        ctx.add_member(&owner, license, &emails[5]),
        ctx.add_member(&owner, license, &emails[6]),
        ctx.add_member(&owner, license, &emails[7]),
    );
    let results = [r0, r1, r2, r3, r4, r5, r6, r7];

    let mut added = Vec::new();
    for (email, (status, body)) in emails.iter().zip(&results) {
        match *status {
            StatusCode::OK => added.push(email.as_str()),
            StatusCode::BAD_REQUEST => {
                assert!(body["message"].as_str().unwrap().starts_with("Your team is full!"));
            }
            other => panic!("{email}: {other} {body}"),
        }
    }
    assert_eq!(added.len(), 4, "{results:?}");

    let view = listed(&ctx, &owner, license).await.unwrap();
    let roster: Vec<&str> = view["teamMembers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["email"].as_str().unwrap())
        .collect();
    assert_eq!(roster.len(), 5);
    assert_eq!(view["availableTeamSlots"], 0);

    for (email, token) in emails.iter().zip(&tokens) {
        let on_roster = roster.contains(&email.as_str());
        assert_eq!(on_roster, added.contains(&email.as_str()), "{email}");
        assert_eq!(listed(&ctx, token, license).await.is_some(), on_roster, "{email}");
    }
}

#[tokio::test]
async fn test_membership_is_visible_from_both_sides() {
    let ctx = TestContext::spawn().await;
    let owner = ctx.signup("owner@team.com").await;
    let member = ctx.signup("member@team.com").await;
    let license = ctx.activate(&owner, "team").await;

    assert!(listed(&ctx, &member, license).await.is_none());
    let (_, status) = ctx.get("/api/v1/license/check-active", Some(&member)).await;
    assert_eq!(status, json!({ "hasActiveLicense": false, "licenseCount": 0 }));

    ctx.add_member(&owner, license, "member@team.com").await;

    let seen = listed(&ctx, &member, license).await.unwrap();
    assert!(seen.get("teamMembers").is_none());
    let (_, status) = ctx.get("/api/v1/license/check-active", Some(&member)).await;
    assert_eq!(status, json!({ "hasActiveLicense": true, "licenseCount": 1 }));

    ctx.remove_member(&owner, license, "member@team.com").await;
    assert!(listed(&ctx, &member, license).await.is_none());

    let removed = ctx.mailer.sent_to("member@team.com");
    assert_eq!(removed.len(), 2);
}

#[tokio::test]
async fn test_owner_cannot_be_removed() {
    let ctx = TestContext::spawn().await;
    let owner = ctx.signup("owner@team.com").await;
    let license = ctx.activate(&owner, "team").await;
    let before = listed(&ctx, &owner, license).await.unwrap();

    let (status, body) = ctx.remove_member(&owner, license, "owner@team.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "The license owner cannot be removed from the team."
    );

    let after = listed(&ctx, &owner, license).await.unwrap();
    assert_eq!(before["teamMembers"], after["teamMembers"]);
}

#[tokio::test]
async fn test_non_owner_cannot_manage_roster() {
    let ctx = TestContext::spawn().await;
    let owner = ctx.signup("owner@team.com").await;
    let member = ctx.signup("member@team.com").await;
    ctx.signup("other@team.com").await;
    let license = ctx.activate(&owner, "team").await;
    ctx.add_member(&owner, license, "member@team.com").await;

    // Adding is scoped to the caller's own licenses
    let (status, _) = ctx.add_member(&member, license, "other@team.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx.remove_member(&member, license, "owner@team.com").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_add_member_errors() {
    let ctx = TestContext::spawn().await;
    let owner = ctx.signup("owner@team.com").await;
    ctx.signup("member@team.com").await;
    let team = ctx.activate(&owner, "team").await;
    let individual = ctx.activate(&owner, "individual").await;

    let (status, _) = ctx.add_member(&owner, individual, "member@team.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx.add_member(&owner, team, "ghost@team.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx.add_member(&owner, 9999, "member@team.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // licenseId as a numeric string
    let (status, _) = ctx
        .post(
            "/api/v1/license/add-team-member",
            Some(&owner),
            &json!({ "licenseId": team.to_string(), "memberEmail": "member@team.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = ctx.add_member(&owner, team, "member@team.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Good news! This user is already part of your team.");
}

#[tokio::test]
async fn test_listing_newest_first_with_name() {
    let ctx = TestContext::spawn().await;
    let owner = ctx.signup("owner@team.com").await;
    ctx.put(
        "/api/v1/settings/update-name",
        &owner,
        &json!({ "name": "Ada" }),
    )
    .await;

    let first = ctx.activate(&owner, "individual").await;
    let second = ctx.activate(&owner, "team").await;

    let (status, body) = ctx.get("/api/v1/license", Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Ada");
    let ids: Vec<i64> = body["licenses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let individual = &body["licenses"][1];
    assert_eq!(individual["type"], "individual");
    assert!(individual.get("teamMembers").is_none());
    assert_eq!(individual["availableTeamSlots"], 0);
}

#[tokio::test]
async fn test_activate_rejects_unknown_type() {
    let ctx = TestContext::spawn().await;
    let owner = ctx.signup("owner@team.com").await;

    let (status, _) = ctx
        .post(
            "/api/v1/license/activate",
            Some(&owner),
            &json!({ "type": "enterprise" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.licenses(&owner).await.is_empty());
}
