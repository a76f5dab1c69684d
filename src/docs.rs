use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::auth::register,
		routes::auth::login,
		routes::auth::employee_login,
		routes::auth::select_organization,
		routes::auth::me,
		routes::auth::logout,
		routes::users::list_users,
		routes::users::get_user,
		routes::roles::list_roles,
		routes::roles::create_role,
		routes::roles::get_role,
		routes::roles::update_role,
		routes::roles::delete_role,
		routes::roles::force_delete_role,
		routes::roles::restore_role,
		routes::roles::actions_for_resource,
		routes::roles::resource_actions,
		routes::roles::check_permission,
		routes::roles::check_permission_by_query,
		routes::resources::list_resources,
		routes::resources::create_resource,
		routes::resources::get_resource,
		routes::resources::update_resource,
		routes::resources::delete_resource,
		routes::resources::force_delete_resource,
		routes::resources::restore_resource,
		routes::actions::list_actions,
		routes::actions::create_action,
		routes::actions::get_action,
		routes::actions::update_action,
		routes::actions::delete_action,
		routes::actions::force_delete_action,
		routes::actions::restore_action,
		routes::campaigns::list_campaigns,
		routes::campaigns::create_campaign,
		routes::campaigns::get_campaign,
		routes::campaigns::update_campaign,
		routes::campaigns::delete_campaign,
		routes::campaigns::force_delete_campaign,
		routes::campaigns::restore_campaign,
		routes::campaigns::export_campaign,
		routes::health::health
	),
	components(
		schemas(
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::SelectOrganizationRequest,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::RoleUpdateRequest,
			models::rbac::Resource,
			models::rbac::ResourceCreateRequest,
			models::rbac::ResourceUpdateRequest,
			models::rbac::Action,
			models::rbac::ActionCreateRequest,
			models::rbac::ActionUpdateRequest,
			models::rbac::PermissionCheckRequest,
			models::rbac::PermissionCheckResponse,
			models::rbac::ResourceActionsResponse,
			models::campaign::Campaign,
			models::campaign::CampaignCreateRequest,
			models::campaign::CampaignUpdateRequest
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Users", description = "User directory"),
		(name = "Roles", description = "Role administration and permission checks"),
		(name = "Resources", description = "Resource registry"),
		(name = "Actions", description = "Action registry"),
		(name = "Campaigns", description = "Campaign management"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		if let Some(components) = openapi.components.as_mut() {
			components.add_security_scheme(
				"bearerAuth",
				SecurityScheme::Http(
					HttpBuilder::new()
						.scheme(HttpAuthScheme::Bearer)
						.bearer_format("JWT")
						.build(),
				),
			);
		}
	}
}

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);

	Ok(doc)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc).unwrap_or_default());

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}
