// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `citadel` binary and drive
//! it over the admin Unix socket.

use std::time::Duration;

use citadel_specs::CitadelProcess;

const TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn banner_and_login_prompt() -> anyhow::Result<()> {
    let citadel = CitadelProcess::start().await?;
    citadel.wait_ready(TIMEOUT).await?;

    let mut client = citadel.connect().await?;
    assert_eq!(client.read_line().await?, "CONNECTED");
    assert!(client.read_line().await?.starts_with("SESSION_ID: "));
    client.read_until("Enter your username:").await?;
    Ok(())
}

#[tokio::test]
async fn login_post_and_read_back() -> anyhow::Result<()> {
    let citadel =
        CitadelProcess::start_seeded(&[("poster", "spec-password", "user")]).await?;
    citadel.wait_ready(TIMEOUT).await?;

    let mut client = citadel.connect().await?;
    client.login("poster", "spec-password").await?;
    client.read_until("What now? (H for help)").await?;

    client.send("E").await?;
    client.read_until("End with a single '.' on a line:").await?;
    client.send("hello from the spec suite").await?;
    client.send(".").await?;
    client.read_until("posted in Lobby").await?;

    client.send("Q").await?;
    client.read_until("Goodbye!").await?;
    client.read_until("DISCONNECTED").await?;
    Ok(())
}

#[tokio::test]
async fn registration_validation_and_first_post() -> anyhow::Result<()> {
    let citadel =
        CitadelProcess::start_seeded(&[("chief", "sysop-password", "sysop")]).await?;
    citadel.wait_ready(TIMEOUT).await?;

    // A newcomer registers through the login workflow's `new` shortcut.
    let mut newcomer = citadel.connect().await?;
    newcomer.register("newbie", "fresh-password").await?;

    // The sysop reviews and approves the registration.
    let mut sysop = citadel.connect().await?;
    sysop.login("chief", "sysop-password").await?;
    let prompt = sysop.read_until("validation").await?;
    assert!(prompt.contains("There is 1 validation to review"), "got {prompt:?}");

    sysop.send("V").await?;
    sysop.read_until("USER VALIDATION").await?;
    sysop.read_until("newbie").await?;
    sysop.send("a").await?;
    sysop.read_until("'newbie' approved!").await?;

    // The approved user can now log in and post.
    let mut newbie = citadel.connect().await?;
    newbie.login("newbie", "fresh-password").await?;
    newbie.send("E").await?;
    newbie.read_until("End with a single '.' on a line:").await?;
    newbie.send("first post!").await?;
    newbie.send(".").await?;
    newbie.read_until("posted in Lobby").await?;
    Ok(())
}

#[tokio::test]
async fn help_and_unknown_commands() -> anyhow::Result<()> {
    let citadel =
        CitadelProcess::start_seeded(&[("helper", "spec-password", "user")]).await?;
    citadel.wait_ready(TIMEOUT).await?;

    let mut client = citadel.connect().await?;
    client.login("helper", "spec-password").await?;

    client.send("H").await?;
    client.read_until("Common Commands:").await?;

    client.send("XYZZY").await?;
    client.read_until("Unknown command").await?;
    Ok(())
}

#[tokio::test]
async fn cancel_leaves_workflow_cleanly() -> anyhow::Result<()> {
    let citadel =
        CitadelProcess::start_seeded(&[("canceler", "spec-password", "user")]).await?;
    citadel.wait_ready(TIMEOUT).await?;

    let mut client = citadel.connect().await?;
    client.login("canceler", "spec-password").await?;
    client.send(".C").await?;
    client.read_until("Please enter the room name:").await?;
    client.send("cancel").await?;
    client.read_until("Cancelled create_room workflow.").await?;

    // Back in command mode.
    client.send("W").await?;
    client.read_until("Online: canceler").await?;
    Ok(())
}

#[tokio::test]
async fn three_failed_logins_block() -> anyhow::Result<()> {
    let citadel =
        CitadelProcess::start_seeded(&[("victim", "right-password", "user")]).await?;
    citadel.wait_ready(TIMEOUT).await?;

    let mut client = citadel.connect().await?;
    client.read_until("Enter your username:").await?;
    for _ in 0..2 {
        client.send("victim").await?;
        client.read_until("Enter your password:").await?;
        client.send("wrong").await?;
        client.read_until("Login failed").await?;
    }
    client.send("victim").await?;
    client.read_until("Enter your password:").await?;
    client.send("still wrong").await?;
    client.read_until("Too many failed login attempts").await?;
    Ok(())
}
