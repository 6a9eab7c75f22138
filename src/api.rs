/// Metadata describing one classic configuration API.
///
/// The upsert protocol is uniform across the classic surface; these flags
/// capture the per-endpoint quirks it has to honor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassicApi {
    pub id: &'static str,
    pub path: &'static str,
    /// Key of the collection in the list response.
    pub collection_key: &'static str,
    /// Endpoint manages exactly one configuration; updates always PUT the
    /// bare path and there is no id.
    pub single_configuration: bool,
    /// The payload body must carry the object id on update.
    pub inject_id_into_payload: bool,
    /// Create-only fields the server rejects on update.
    pub strip_on_update: &'static [&'static str],
    /// Creation must pass `position=PREPEND` so new rules take precedence.
    pub prepend_position_param: bool,
    /// Uploads go through the multipart endpoint instead of a JSON body.
    pub multipart: bool,
}

pub const API_DASHBOARD: &str = "dashboard";
pub const API_WEB_APPLICATION: &str = "web-application";
pub const API_MOBILE_APPLICATION: &str = "mobile-application";
pub const API_EXTENSION: &str = "extension";

static CLASSIC_APIS: &[ClassicApi] = &[
    ClassicApi {
        id: API_DASHBOARD,
        path: "api/config/v1/dashboards",
        collection_key: "dashboards",
        single_configuration: false,
        inject_id_into_payload: true,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "report",
        path: "api/config/v1/reports",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: true,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "service-detection-full-web-request",
        path: "api/config/v1/service/detectionRules/FULL_WEB_REQUEST",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: true,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "service-detection-full-web-service",
        path: "api/config/v1/service/detectionRules/FULL_WEB_SERVICE",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: true,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "app-detection-rule",
        path: "api/config/v1/applicationDetectionRules",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: true,
        multipart: false,
    },
    ClassicApi {
        id: API_WEB_APPLICATION,
        path: "api/config/v1/applications/web",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: API_MOBILE_APPLICATION,
        path: "api/config/v1/applications/mobile",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &["applicationType"],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "alerting-profile",
        path: "api/config/v1/alertingProfiles",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "management-zone",
        path: "api/config/v1/managementZones",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "auto-tag",
        path: "api/config/v1/autoTags",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "request-attribute",
        path: "api/config/v1/service/requestAttributes",
        collection_key: "values",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: API_EXTENSION,
        path: "api/config/v1/extensions",
        collection_key: "extensions",
        single_configuration: false,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: true,
    },
    ClassicApi {
        id: "frequent-issue-detection",
        path: "api/config/v1/frequentIssueDetection",
        collection_key: "values",
        single_configuration: true,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
    ClassicApi {
        id: "data-privacy",
        path: "api/config/v1/dataPrivacy",
        collection_key: "values",
        single_configuration: true,
        inject_id_into_payload: false,
        strip_on_update: &[],
        prepend_position_param: false,
        multipart: false,
    },
];

/// Look up a classic API by its identifier.
pub fn classic_api(id: &str) -> Option<&'static ClassicApi> {
    CLASSIC_APIS.iter().find(|api| api.id == id)
}

pub fn all_classic_apis() -> &'static [ClassicApi] {
    CLASSIC_APIS
}
