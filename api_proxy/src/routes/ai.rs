use actix_web::{Responder, post, web};
use common::{error::Res, http::Success, identity::AuthUser};

use crate::{ProxyState, dtos::completion::CompletionRequest, upstream::UpstreamCall};

/// Forwards a chat completion to OpenAI with the server key.
///
/// Completions are never cached.
#[post("/completions")]
pub async fn post_completions(
    state: web::Data<ProxyState>,
    user: web::ReqData<AuthUser>,
    req: web::Json<CompletionRequest>,
) -> Res<impl Responder> {
    let body = req.into_inner().into_upstream_body()?;
    log::debug!("Completion requested by {} with model {}", user.user_id, body["model"]);

    let payload = state
        .openai
        .call(UpstreamCall::post("chat/completions", body))
        .await?;
    Success::ok(payload)
}
