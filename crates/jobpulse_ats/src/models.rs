//! Wire types for the ATS REST surface (spec §4.2, §4.6).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "BhRestToken")]
    pub rest_token: String,
    #[serde(rename = "restUrl")]
    pub rest_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JobPage {
    pub data: Vec<RawJob>,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawJob {
    pub id: i64,
    pub title: String,
    #[serde(rename = "publicDescription", default)]
    pub description_html: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(rename = "dateAdded", default)]
    pub date_added: Option<i64>,
    #[serde(rename = "isOpen", default)]
    pub is_open: bool,
    #[serde(rename = "isRemote", default)]
    pub is_remote: bool,
    #[serde(rename = "isHybrid", default)]
    pub is_hybrid: bool,
    pub owner: Option<RawOwner>,
    #[serde(rename = "assignedUsers", default)]
    pub assigned_users: Option<RawUserList>,
    #[serde(rename = "responseUser", default)]
    pub response_user: Option<RawOwner>,
    #[serde(rename = "clientCorporation", default)]
    pub client_corporation: Option<RawClientCorporation>,
}

#[derive(Debug, Deserialize)]
pub struct RawClientCorporation {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RawOwner {
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawUserList {
    #[serde(default)]
    pub data: Vec<RawOwner>,
}

#[derive(Debug, Deserialize)]
pub struct RawAttachment {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "fileType", default)]
    pub file_type: String,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(rename = "fileContent", default)]
    pub file_content: Option<String>,
    #[serde(rename = "dateAdded", default)]
    pub date_added: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawCandidate {
    pub id: i64,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}
