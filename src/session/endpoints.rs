//! Host derivation and endpoint URLs for the FusionSolar portal.

use url::Url;

pub const DEFAULT_PORTAL_DOMAIN: &str = "fusionsolar.huawei.com";
pub const DEFAULT_SUBDOMAIN: &str = "region01eu5";

/// Public subdomains look like `region01eu5`; the login host drops `regionNN`.
const REGION_PREFIX: &str = "region";
const REGION_PREFIX_LEN: usize = 8;

pub const CAPTCHA_PROBE_SERVICE: &str =
    "%2Funisess%2Fv1%2Fauth%3Fservice%3D%252Fnetecowebext%252Fhome%252Findex.html";
pub const LOGIN_SERVICE_PATH: &str =
    "/unisess/v1/auth?service=/netecowebext/home/index.html#/LOGIN";

pub const VERIFY_CODE_PATH: &str = "/unisso/verifycode";
pub const PREVALIDATE_PATH: &str = "/unisso/preValidVerifycode";
pub const VALIDATE_USER_PATH: &str = "/unisso/v2/validateUser.action";
pub const COMPANY_PATH: &str = "/rest/neteco/web/organization/v2/company/current";
pub const SESSION_PATH: &str = "/unisess/v1/auth/session";
pub const LOGOUT_PATH: &str = "/unisess/v1/logout";

/// Derives the login subdomain from the public one.
///
/// `region01eu5` becomes `eu5`; anything else is returned unchanged.
pub fn login_subdomain(subdomain: &str) -> &str {
    if subdomain.starts_with(REGION_PREFIX) {
        match subdomain.get(REGION_PREFIX_LEN..) {
            Some(rest) if !rest.is_empty() => rest,
            _ => subdomain,
        }
    } else {
        subdomain
    }
}

/// Base URLs for the public (data) host and the login host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalEndpoints {
    public_base: Url,
    login_base: Url,
}

impl PortalEndpoints {
    pub fn new(subdomain: &str, portal_domain: &str) -> Result<Self, url::ParseError> {
        let public_base = Url::parse(&format!("https://{subdomain}.{portal_domain}/"))?;
        let login_base = Url::parse(&format!(
            "https://{}.{portal_domain}/",
            login_subdomain(subdomain)
        ))?;
        Ok(Self {
            public_base,
            login_base,
        })
    }

    pub fn public_base(&self) -> &Url {
        &self.public_base
    }

    pub fn login_base(&self) -> &Url {
        &self.login_base
    }

    /// `https://{public}.{domain}` without the trailing slash, as the portal
    /// expects inside `service` parameters.
    pub fn public_origin(&self) -> String {
        self.public_base.as_str().trim_end_matches('/').to_string()
    }

    pub fn public(&self, path: &str) -> Result<Url, url::ParseError> {
        self.public_base.join(path)
    }

    pub fn login(&self, path: &str) -> Result<Url, url::ParseError> {
        self.login_base.join(path)
    }

    /// `service` value sent with the credential submission.
    pub fn login_service(&self) -> String {
        format!("{}{}", self.public_origin(), LOGIN_SERVICE_PATH)
    }
}
