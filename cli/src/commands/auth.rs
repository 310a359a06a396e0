use serde_json::json;

use crate::util::{
    RequestError, StoredSession, api_request, clear_session, exit_code_for, exit_error,
    load_session, pretty, require_token, save_session, send, session_path,
};

pub async fn login(api_url: &str, username: &str, password: &str) -> i32 {
    let body = json!({ "username": username, "password": password });
    let (status, resp) = match send(
        api_url,
        reqwest::Method::POST,
        "/v1/auth/login",
        None,
        Some(body),
        &[],
    )
    .await
    {
        Ok(result) => result,
        Err(RequestError::Url(message)) => exit_error(&message, None),
        Err(RequestError::Connection(message)) => exit_error(
            &message,
            Some("Is the API server running? Check CROPREC_API_URL."),
        ),
    };

    let exit_code = exit_code_for(status);
    if exit_code != 0 {
        eprintln!("{}", pretty(&resp));
        return exit_code;
    }

    let session: StoredSession = match serde_json::from_value(json!({
        "api_url": api_url,
        "token": resp["token"],
        "username": resp["username"],
        "role": resp["role"],
        "expires_at": resp["expires_at"],
    })) {
        Ok(session) => session,
        Err(e) => exit_error(&format!("Unexpected login response: {e}"), None),
    };

    let path = session_path();
    if let Err(e) = save_session(&path, &session) {
        exit_error(&format!("Failed to store session: {e}"), None);
    }

    let output = json!({
        "status": "authenticated",
        "username": session.username,
        "role": session.role,
        "expires_at": session.expires_at,
        "session_path": path.to_string_lossy()
    });
    println!("{}", pretty(&output));
    0
}

/// Revoke the session on the server, then forget it locally either way.
pub async fn logout(api_url: &str) -> i32 {
    let path = session_path();
    let server = match load_session(&path) {
        Some(session) => {
            match send(
                api_url,
                reqwest::Method::POST,
                "/v1/auth/logout",
                Some(&session.token),
                None,
                &[],
            )
            .await
            {
                Ok((status, _)) if exit_code_for(status) == 0 => "revoked",
                Ok(_) => "already_invalid",
                Err(_) => "unreachable",
            }
        }
        None => "no_session",
    };

    let removed = match clear_session(&path) {
        Ok(removed) => removed,
        Err(e) => exit_error(&format!("Failed to remove session file: {e}"), None),
    };

    let output = json!({
        "status": "logged_out",
        "server_session": server,
        "removed_local_session": removed,
        "session_path": path.to_string_lossy()
    });
    println!("{}", pretty(&output));
    0
}

pub async fn whoami(api_url: &str) -> i32 {
    let token = require_token();
    api_request(
        api_url,
        reqwest::Method::GET,
        "/v1/auth/session",
        Some(&token),
        None,
        &[],
    )
    .await
}
