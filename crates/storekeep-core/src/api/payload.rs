//! JSON:API documents returned by the vendor. Only the fields the cache
//! mirrors are declared; everything else is ignored on decode.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Document<T> {
    pub data: T,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Resource<A> {
    pub id: String,
    #[serde(default)]
    pub attributes: A,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAttributes {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoAttributes {
    pub app_store_state: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoLocalizationAttributes {
    pub locale: Option<String>,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub privacy_policy_url: Option<String>,
    pub privacy_choices_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionAttributes {
    pub platform: Option<String>,
    pub app_store_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionLocalizationAttributes {
    pub locale: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub marketing_url: Option<String>,
    pub promotional_text: Option<String>,
    pub support_url: Option<String>,
    pub whats_new: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotSetAttributes {
    pub screenshot_display_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotAttributes {
    pub image_asset: Option<ImageAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub template_url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationAttributes {
    #[serde(default)]
    pub upload_operations: Vec<UploadOperationPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOperationPayload {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub request_headers: Vec<HeaderPayload>,
}

#[derive(Debug, Deserialize)]
pub struct HeaderPayload {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_documents_decode_with_next_link_and_sparse_attributes() {
        let body = r#"{
            "data": [
                {"type": "apps", "id": "app_42", "attributes": {"name": "Widget", "bundleId": "com.example.widget"}},
                {"type": "apps", "id": "app_43"}
            ],
            "links": {"self": "https://example.test/v1/apps", "next": "https://example.test/v1/apps?cursor=2"}
        }"#;

        let document: Document<Vec<Resource<AppAttributes>>> = serde_json::from_str(body).unwrap();
        assert_eq!(document.data.len(), 2);
        assert_eq!(document.data[0].attributes.name.as_deref(), Some("Widget"));
        assert_eq!(document.data[1].attributes.name, None);
        assert_eq!(
            document.links.next.as_deref(),
            Some("https://example.test/v1/apps?cursor=2")
        );
    }

    #[test]
    fn reservation_decodes_upload_operations() {
        let body = r#"{
            "data": {
                "type": "appScreenshots",
                "id": "shot_1",
                "attributes": {
                    "uploadOperations": [
                        {"method": "PUT", "url": "https://upload.test/a", "offset": 0, "length": 10,
                         "requestHeaders": [{"name": "Content-Type", "value": "image/jpeg"}]}
                    ]
                }
            }
        }"#;

        let document: Document<Resource<ReservationAttributes>> =
            serde_json::from_str(body).unwrap();
        let operation = &document.data.attributes.upload_operations[0];
        assert_eq!(operation.method, "PUT");
        assert_eq!(operation.length, Some(10));
        assert_eq!(operation.request_headers[0].name, "Content-Type");
    }
}
