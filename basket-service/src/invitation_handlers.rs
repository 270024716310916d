use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};

use crate::invitations::{Invitation, InvitationError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub store_id: u64,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CreateInvitationResponse {
    pub message: &'static str,
    pub code: String,
    pub invitation: Invitation,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptInvitationResponse {
    pub message: &'static str,
    pub store_id: u64,
}

fn accept_event(err: &InvitationError) -> &'static str {
    match err {
        InvitationError::Expired => "expired",
        InvitationError::InvalidState => "not_pending",
        InvitationError::AlreadyMember => "already_member",
        InvitationError::NotFound(_) => "unknown_code",
        _ => "accept_failed",
    }
}

pub async fn create_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<CreateInvitationResponse>)> {
    let invitation = state
        .invitations
        .create_invitation(auth.user_id, input.store_id, &input.email)
        .await?;

    state.metrics.invitation_event("created");
    Ok((
        StatusCode::CREATED,
        Json(CreateInvitationResponse {
            message: "Invitation sent successfully",
            code: invitation.code.clone(),
            invitation,
        }),
    ))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<AcceptInvitationRequest>,
) -> ApiResult<Json<AcceptInvitationResponse>> {
    match state
        .invitations
        .accept_invitation(&input.code, auth.user_id)
        .await
    {
        Ok(invitation) => {
            state.metrics.invitation_event("accepted");
            Ok(Json(AcceptInvitationResponse {
                message: "Invitation accepted; sign in again to refresh your store access",
                store_id: invitation.store_id,
            }))
        }
        Err(err) => {
            state.metrics.invitation_event(accept_event(&err));
            Err(ApiError::from(err))
        }
    }
}

pub async fn list_pending_invitations(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(store_id): Path<u64>,
) -> ApiResult<Json<Vec<Invitation>>> {
    let invitations = state
        .invitations
        .get_pending_invitations(store_id, auth.user_id)
        .await?;
    Ok(Json(invitations))
}

pub async fn cancel_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invitation_id): Path<u64>,
) -> ApiResult<StatusCode> {
    state
        .invitations
        .cancel_invitation(invitation_id, auth.user_id)
        .await?;
    state.metrics.invitation_event("cancelled");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_staff_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((store_id, member_id)): Path<(u64, u64)>,
) -> ApiResult<StatusCode> {
    state
        .invitations
        .remove_staff_member(store_id, member_id, auth.user_id)
        .await?;
    state.metrics.invitation_event("staff_removed");
    Ok(StatusCode::NO_CONTENT)
}
