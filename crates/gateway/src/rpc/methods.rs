//! Fully-qualified RPC method ids.

pub(crate) const SIGN_IN: &str = "/portico.api.v1.AuthService/SignIn";
pub(crate) const SIGN_UP: &str = "/portico.api.v1.AuthService/SignUp";
pub(crate) const SIGN_OUT: &str = "/portico.api.v1.AuthService/SignOut";
pub(crate) const REFRESH_TOKEN: &str = "/portico.api.v1.AuthService/RefreshToken";
pub(crate) const GET_CURRENT_USER: &str = "/portico.api.v1.AuthService/GetCurrentUser";

pub(crate) const GET_USER: &str = "/portico.api.v1.UserService/GetUser";
pub(crate) const LIST_USERS: &str = "/portico.api.v1.UserService/ListUsers";
pub(crate) const CREATE_USER: &str = "/portico.api.v1.UserService/CreateUser";
pub(crate) const UPDATE_USER: &str = "/portico.api.v1.UserService/UpdateUser";
pub(crate) const DELETE_USER: &str = "/portico.api.v1.UserService/DeleteUser";
pub(crate) const CREATE_PERSONAL_ACCESS_TOKEN: &str =
    "/portico.api.v1.UserService/CreatePersonalAccessToken";
pub(crate) const LIST_PERSONAL_ACCESS_TOKENS: &str =
    "/portico.api.v1.UserService/ListPersonalAccessTokens";
pub(crate) const DELETE_PERSONAL_ACCESS_TOKEN: &str =
    "/portico.api.v1.UserService/DeletePersonalAccessToken";

pub(crate) const GET_INSTANCE_PROFILE: &str = "/portico.api.v1.InstanceService/GetInstanceProfile";

/// Methods callable without a credential, shared by every surface.
pub(crate) const PUBLIC_METHODS: &[&str] = &[
    SIGN_IN,
    SIGN_UP,
    REFRESH_TOKEN,
    SIGN_OUT,
    GET_INSTANCE_PROFILE,
];

pub(crate) const ALL_METHODS: &[&str] = &[
    SIGN_IN,
    SIGN_UP,
    SIGN_OUT,
    REFRESH_TOKEN,
    GET_CURRENT_USER,
    GET_USER,
    LIST_USERS,
    CREATE_USER,
    UPDATE_USER,
    DELETE_USER,
    CREATE_PERSONAL_ACCESS_TOKEN,
    LIST_PERSONAL_ACCESS_TOKENS,
    DELETE_PERSONAL_ACCESS_TOKEN,
    GET_INSTANCE_PROFILE,
];

pub(crate) fn is_public(method: &str) -> bool {
    PUBLIC_METHODS.contains(&method)
}

/// Metric label for `method`; unknown ids collapse into one series.
pub(crate) fn label(method: &str) -> &str {
    if ALL_METHODS.contains(&method) {
        method
    } else {
        "unknown"
    }
}
