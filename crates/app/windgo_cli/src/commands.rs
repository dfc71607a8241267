//! Subcommand implementations. Output is plain text on stdout.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;
use windgo_core::auth::github::DeviceAuthorization;
use windgo_core::models::auth::{Device, User};
use windgo_core::models::chat::{Message, Pagination, Room};

use crate::cli::{Cli, Commands};
use crate::client::{ACCESS_COOKIE, ApiClient, ApiResponse, Auth, REFRESH_COOKIE};
use crate::storage::{self, Credentials};
use crate::{Error, Result, ssh};

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct NonceBody {
    nonce_id: String,
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct SshLoginBody {
    user_id: i64,
    device_id: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct MeBody {
    user: User,
    current_device: Option<Device>,
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct RoomsBody {
    rooms: Vec<Room>,
}

#[derive(Debug, Deserialize)]
struct MessagesBody {
    messages: Vec<Message>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct SentBody {
    data: Message,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    username: String,
    email: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct UsersBody {
    users: Vec<DirectoryEntry>,
}

pub async fn dispatch(args: &Cli) -> Result<()> {
    if let Commands::Version = args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let dir = storage::config_dir()?;
    let client = ApiClient::new(&args.base_url)?;

    match &args.command {
        Commands::Version => Ok(()),
        Commands::Register {
            username,
            email,
            password,
        } => {
            let resp = client
                .post(
                    "/auth/register",
                    Auth::None,
                    &json!({"username": username, "email": email, "password": password}),
                )
                .await?;
            let body: TokenBody = resp.into_body()?;
            save_token_login(&dir, &client, body)?;
            Ok(())
        }
        Commands::Login { email, password } => {
            let resp = client
                .post(
                    "/auth/login",
                    Auth::None,
                    &json!({"email": email, "password": password}),
                )
                .await?;
            save_token_login(&dir, &client, resp.into_body()?)?;
            Ok(())
        }
        Commands::DeviceLogin { timeout } => device_login(&dir, &client, *timeout).await,
        Commands::SshLogin {
            github_user,
            key,
            device_name,
        } => ssh_login(&dir, &client, github_user, key.as_deref(), device_name).await,
        Commands::Refresh => refresh(&dir, &client).await,
        Commands::Logout => logout(&dir, &client).await,
        Commands::Me => me(&dir, &client).await,
        Commands::Whoami => {
            let creds = storage::require(&dir)?;
            println!("{} (id {}) at {}", creds.username, creds.user_id, creds.base_url);
            if let Some(device_id) = &creds.device_id {
                println!("device: {device_id}");
            }
            Ok(())
        }
        Commands::Rooms => {
            let rooms: RoomsBody = client.get("/api/v1/rooms", Auth::None).await?.into_body()?;
            for room in rooms.rooms {
                println!("{}\t{}", room.id, room.name);
            }
            Ok(())
        }
        Commands::CreateRoom { name } => {
            let creds = storage::require(&dir)?;
            let room: Room = client
                .post(
                    "/api/v1/rooms",
                    Auth::Bearer(&creds.access_token),
                    &json!({"name": name}),
                )
                .await?
                .into_body()?;
            println!("created room {} ({})", room.name, room.id);
            Ok(())
        }
        Commands::Messages {
            room_id,
            page,
            limit,
        } => {
            let creds = storage::require(&dir)?;
            let body: MessagesBody = client
                .get_query(
                    &format!("/api/v1/rooms/{room_id}/messages"),
                    Auth::Bearer(&creds.access_token),
                    &[("page", page.to_string()), ("limit", limit.to_string())],
                )
                .await?
                .into_body()?;
            for m in &body.messages {
                println!(
                    "[{}] {}: {}",
                    m.created_at.format("%Y-%m-%d %H:%M"),
                    m.username,
                    m.content
                );
            }
            let p = body.pagination;
            println!("page {}/{} ({} messages)", p.page, p.total_pages, p.total);
            Ok(())
        }
        Commands::Send { room_id, content } => {
            let creds = storage::require(&dir)?;
            let sent: SentBody = client
                .post(
                    "/api/v1/messages",
                    Auth::Bearer(&creds.access_token),
                    &json!({"room_id": room_id, "content": content.join(" ")}),
                )
                .await?
                .into_body()?;
            println!("sent message {}", sent.data.id);
            Ok(())
        }
        Commands::Users { search } => {
            let creds = storage::require(&dir)?;
            let query: Vec<(&str, String)> =
                search.iter().map(|s| ("search", s.clone())).collect();
            let body: UsersBody = client
                .get_query("/api/v1/users", Auth::Bearer(&creds.access_token), &query)
                .await?
                .into_body()?;
            for u in body.users {
                println!("{}\t{}\t{}", u.username, u.email, u.status);
            }
            Ok(())
        }
        Commands::RevokeDevice { device_id } => {
            let creds = storage::require(&dir)?;
            client
                .post(
                    &format!("/devices/revoke/{device_id}"),
                    Auth::Bearer(&creds.access_token),
                    &json!({}),
                )
                .await?;
            println!("revoked {device_id}");
            Ok(())
        }
    }
}

fn save_token_login(dir: &Path, client: &ApiClient, body: TokenBody) -> Result<()> {
    storage::save(
        dir,
        &Credentials {
            base_url: client.base_url().to_string(),
            access_token: body.token,
            refresh_token: None,
            device_id: None,
            user_id: body.user.id,
            username: body.user.username.clone(),
        },
    )?;
    println!("logged in as {} (id {})", body.user.username, body.user.id);
    Ok(())
}

async fn device_login(dir: &Path, client: &ApiClient, timeout: u64) -> Result<()> {
    let auth: DeviceAuthorization = client
        .post("/auth/github/device/start", Auth::None, &json!({}))
        .await?
        .into_body()?;

    match &auth.verification_uri_complete {
        Some(uri) => println!("Open {uri} to authorize."),
        None => println!(
            "Open {} and enter code {}",
            auth.verification_uri, auth.user_code
        ),
    }
    println!("Waiting for authorization...");

    let resp = client
        .post(
            "/auth/github/device/poll",
            Auth::None,
            &json!({
                "device_code": auth.device_code,
                "timeout": timeout,
                "interval": auth.interval,
            }),
        )
        .await?;
    save_token_login(dir, client, resp.into_body()?)
}

async fn ssh_login(
    dir: &Path,
    client: &ApiClient,
    github_user: &str,
    key: Option<&Path>,
    device_name: &str,
) -> Result<()> {
    let key_path = ssh::find_key(key)?;
    log::info!("signing with {}", key_path.display());

    let nonce: NonceBody = client
        .post("/auth/nonce", Auth::None, &json!({}))
        .await?
        .into_body()?;
    let signed = ssh::sign_nonce(&key_path, &nonce.nonce)?;

    let resp = client
        .post(
            "/auth/login/ssh",
            Auth::None,
            &json!({
                "github_user": github_user,
                "signed": signed.signature,
                "pub_fingerprint": signed.fingerprint,
                "nonce_id": nonce.nonce_id,
                "device_name": device_name,
                "device_type": "cli",
            }),
        )
        .await?;
    let (access_token, refresh_token) = session_cookies(&resp)?;
    let body: SshLoginBody = resp.into_body()?;

    storage::save(
        dir,
        &Credentials {
            base_url: client.base_url().to_string(),
            access_token,
            refresh_token: Some(refresh_token),
            device_id: Some(body.device_id.clone()),
            user_id: body.user_id,
            username: body.user.username.clone(),
        },
    )?;
    println!(
        "logged in as {} (id {}) on device {}",
        body.user.username, body.user_id, body.device_id
    );
    Ok(())
}

fn session_cookies(resp: &ApiResponse) -> Result<(String, String)> {
    let get = |name: &str| {
        resp.cookies
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| Error::Custom(format!("server did not set the {name} cookie")))
    };
    Ok((get(ACCESS_COOKIE)?, get(REFRESH_COOKIE)?))
}

async fn refresh(dir: &Path, client: &ApiClient) -> Result<()> {
    let mut creds = storage::require(dir)?;
    let token = creds.refresh_token.clone().ok_or(Error::NoRefreshToken)?;
    let resp = client
        .post("/auth/refresh", Auth::RefreshCookie(&token), &json!({}))
        .await?;
    let (access_token, refresh_token) = session_cookies(&resp)?;
    creds.access_token = access_token;
    creds.refresh_token = Some(refresh_token);
    storage::save(dir, &creds)?;
    println!("token refreshed");
    Ok(())
}

async fn logout(dir: &Path, client: &ApiClient) -> Result<()> {
    let creds = storage::require(dir)?;
    if let Some(token) = &creds.refresh_token
        && let Err(e) = client
            .post("/auth/logout", Auth::RefreshCookie(token), &json!({}))
            .await
    {
        log::warn!("server logout failed: {e}");
    }
    storage::clear(dir)?;
    println!("logged out");
    Ok(())
}

async fn me(dir: &Path, client: &ApiClient) -> Result<()> {
    let creds = storage::require(dir)?;
    let body: MeBody = client
        .get("/me", Auth::Bearer(&creds.access_token))
        .await?
        .into_body()?;
    let u = &body.user;
    println!(
        "{} <{}> id={} role={} provider={}",
        u.username,
        u.email,
        u.id,
        u.role,
        u.provider.as_str()
    );
    let current = body.current_device.as_ref().map(|d| d.device_id.as_str());
    for d in &body.devices {
        let marker = if Some(d.device_id.as_str()) == current { "*" } else { " " };
        println!(
            "{marker} {}\t{}\t{}\tlast used {}",
            d.device_id,
            d.device_name,
            d.device_type.as_str(),
            d.last_used_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
