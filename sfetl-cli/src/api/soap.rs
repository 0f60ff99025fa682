//! SOAP envelopes for the Partner and Metadata APIs
//!
//! Only the three calls the REST API cannot do are covered: `login`,
//! `convertLead` and `createMetadata` for custom objects. Envelopes are
//! built as strings with escaped values, responses are parsed with roxmltree.

use anyhow::{Context, Result, bail};
use quick_xml::escape::escape;

use super::error::ApiError;
use super::models::{LeadConvertOutcome, LeadConvertRequest};

const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const PARTNER_NS: &str = "urn:partner.soap.sforce.com";
const METADATA_NS: &str = "http://soap.sforce.com/2006/04/metadata";

/// Session returned by a Partner `login` call
#[derive(Debug, Clone, PartialEq)]
pub struct LoginResult {
    pub session_id: String,
    pub server_url: String,
}

impl LoginResult {
    /// Instance base URL (`https://host`) derived from the SOAP server URL
    pub fn instance_url(&self) -> String {
        match self.server_url.find("/services/") {
            Some(idx) => self.server_url[..idx].to_string(),
            None => self.server_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Result of a single-record SOAP save (createMetadata, convertLead)
#[derive(Debug, Clone, PartialEq)]
pub struct SoapSaveResult {
    pub success: bool,
    pub status_code: Option<String>,
    pub message: Option<String>,
}

pub fn login_envelope(username: &str, password: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<env:Envelope xmlns:env="{SOAP_ENV}" xmlns:urn="{PARTNER_NS}">
  <env:Body>
    <urn:login>
      <urn:username>{}</urn:username>
      <urn:password>{}</urn:password>
    </urn:login>
  </env:Body>
</env:Envelope>"#,
        escape(username),
        escape(password)
    )
}

pub fn convert_lead_envelope(session_id: &str, request: &LeadConvertRequest) -> String {
    let opportunity = match &request.opportunity_id {
        Some(id) => format!(
            "<urn:opportunityId>{}</urn:opportunityId>\n        <urn:doNotCreateOpportunity>false</urn:doNotCreateOpportunity>",
            escape(id.as_str())
        ),
        None => "<urn:doNotCreateOpportunity>true</urn:doNotCreateOpportunity>".to_string(),
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<env:Envelope xmlns:env="{SOAP_ENV}" xmlns:urn="{PARTNER_NS}">
  <env:Header>
    <urn:SessionHeader><urn:sessionId>{}</urn:sessionId></urn:SessionHeader>
  </env:Header>
  <env:Body>
    <urn:convertLead>
      <urn:leadConverts>
        <urn:leadId>{}</urn:leadId>
        <urn:accountId>{}</urn:accountId>
        <urn:contactId>{}</urn:contactId>
        <urn:convertedStatus>{}</urn:convertedStatus>
        {}
        <urn:overwriteLeadSource>false</urn:overwriteLeadSource>
        <urn:sendNotificationEmail>false</urn:sendNotificationEmail>
      </urn:leadConverts>
    </urn:convertLead>
  </env:Body>
</env:Envelope>"#,
        escape(session_id),
        escape(request.lead_id.as_str()),
        escape(request.account_id.as_str()),
        escape(request.contact_id.as_str()),
        escape(request.converted_status.as_str()),
        opportunity
    )
}

pub fn create_custom_object_envelope(
    session_id: &str,
    full_name: &str,
    label: &str,
    plural_label: &str,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<env:Envelope xmlns:env="{SOAP_ENV}" xmlns:met="{METADATA_NS}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <env:Header>
    <met:SessionHeader><met:sessionId>{}</met:sessionId></met:SessionHeader>
  </env:Header>
  <env:Body>
    <met:createMetadata>
      <met:metadata xsi:type="met:CustomObject">
        <met:fullName>{}</met:fullName>
        <met:label>{}</met:label>
        <met:pluralLabel>{}</met:pluralLabel>
        <met:nameField>
          <met:label>Name</met:label>
          <met:type>Text</met:type>
        </met:nameField>
        <met:deploymentStatus>Deployed</met:deploymentStatus>
        <met:sharingModel>ReadWrite</met:sharingModel>
      </met:metadata>
    </met:createMetadata>
  </env:Body>
</env:Envelope>"#,
        escape(session_id),
        escape(full_name),
        escape(label),
        escape(plural_label)
    )
}

fn child_text<'a, 'input>(node: roxmltree::Node<'a, 'input>, name: &str) -> Option<&'a str> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Turn a SOAP fault into an ApiError, if the document carries one
fn fault(doc: &roxmltree::Document, status: u16) -> Option<ApiError> {
    let node = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "Fault")?;
    let code = child_text(node, "faultcode").unwrap_or_default();
    Some(ApiError {
        status,
        error_code: code.rsplit(':').next().unwrap_or(code).to_string(),
        message: child_text(node, "faultstring")
            .unwrap_or("SOAP fault")
            .to_string(),
    })
}

pub fn parse_login_response(status: u16, body: &str) -> Result<LoginResult> {
    let doc = roxmltree::Document::parse(body).context("Failed to parse SOAP login response")?;
    if let Some(err) = fault(&doc, status) {
        return Err(err.into());
    }

    let root = doc.root();
    let session_id = child_text(root, "sessionId").context("Login response has no sessionId")?;
    let server_url = child_text(root, "serverUrl").context("Login response has no serverUrl")?;

    Ok(LoginResult {
        session_id: session_id.to_string(),
        server_url: server_url.to_string(),
    })
}

/// Parse the first `<result>` of a createMetadata / convertLead response
pub fn parse_save_response(status: u16, body: &str) -> Result<SoapSaveResult> {
    let doc = roxmltree::Document::parse(body).context("Failed to parse SOAP response")?;
    if let Some(err) = fault(&doc, status) {
        return Err(err.into());
    }

    let Some(result) = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "result")
    else {
        bail!("SOAP response has no result element");
    };

    let success = child_text(result, "success") == Some("true");
    let errors = result
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "errors");

    Ok(SoapSaveResult {
        success,
        status_code: errors.and_then(|e| child_text(e, "statusCode")).map(String::from),
        message: errors.and_then(|e| child_text(e, "message")).map(String::from),
    })
}

impl From<SoapSaveResult> for LeadConvertOutcome {
    fn from(result: SoapSaveResult) -> Self {
        Self {
            success: result.success,
            status_code: result.status_code,
            message: result.message,
        }
    }
}
