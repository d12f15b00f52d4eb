//! Call-control REST client (§6): outbound call placement, in-flight
//! redirect, hangup, and recording download with retry.

use crate::error::{GatewayError, Result};

/// Retry delays for recording download, in order.
const RECORDING_RETRY_DELAYS_MS: &[u64] = &[1_000, 2_000, 4_000, 8_000];

/// HTTP-basic-authenticated client for the telephony provider's call-control
/// REST API.
pub struct TelephonyRestClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TelephonyRestClient {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self::with_base_url(account_sid, auth_token, "https://api.twilio.com/2010-04-01")
    }

    pub fn with_base_url(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: base_url.into(),
        }
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", self.base_url, self.account_sid)
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{call_sid}.json",
            self.base_url, self.account_sid
        )
    }

    /// Place an outbound call.
    pub async fn create_call(
        &self,
        to: &str,
        from: &str,
        twiml_url: &str,
        status_callback: &str,
    ) -> Result<String> {
        let resp = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", from),
                ("Url", twiml_url),
                ("StatusCallback", status_callback),
                ("StatusCallbackEvent", "initiated ringing answered completed"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Outbound(e.to_string()))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| GatewayError::Outbound(e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Outbound(e.to_string()))?;
        body.get("sid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Outbound("call-create response missing sid".into()))
    }

    /// Redirect an in-flight call to a new TwiML URL (used to play a DTMF
    /// digit press before hanging up, per the auto-press engine).
    pub async fn redirect_call(&self, call_sid: &str, twiml_url: &str) -> Result<()> {
        self.client
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Url", twiml_url), ("Method", "POST")])
            .send()
            .await
            .map_err(|e| GatewayError::Outbound(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::Outbound(e.to_string()))?;
        Ok(())
    }

    /// Hang up an in-flight call.
    pub async fn hangup_call(&self, call_sid: &str) -> Result<()> {
        self.client
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await
            .map_err(|e| GatewayError::Outbound(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::Outbound(e.to_string()))?;
        Ok(())
    }

    /// Fetch a recording, trying `<url>.mp3` then falling back to `<url>.wav`,
    /// retrying on failure at [`RECORDING_RETRY_DELAYS_MS`] intervals.
    pub async fn fetch_recording(&self, recording_url: &str) -> Result<(bytes::Bytes, &'static str)> {
        for (attempt, delay_ms) in std::iter::once(0)
            .chain(RECORDING_RETRY_DELAYS_MS.iter().copied())
            .enumerate()
        {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            if let Ok(bytes) = self.try_fetch(&format!("{recording_url}.mp3")).await {
                return Ok((bytes, "audio/mpeg"));
            }
            if let Ok(bytes) = self.try_fetch(&format!("{recording_url}.wav")).await {
                return Ok((bytes, "audio/wav"));
            }
        }
        Err(GatewayError::Outbound(format!(
            "recording download exhausted retries for {recording_url}"
        )))
    }

    async fn try_fetch(&self, url: &str) -> Result<bytes::Bytes> {
        let resp = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| GatewayError::Outbound(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::Outbound(e.to_string()))?;
        resp.bytes()
            .await
            .map_err(|e| GatewayError::Outbound(e.to_string()))
    }
}

/// Build the TwiML a redirect points at for an auto-press removal: play the
/// digit via DTMF, optionally speak a removal line, then hang up (§4.9 step
/// 3, scenario 5: `<Play digits="N"/><Pause length="1"/><Say>…</Say><Hangup/>`).
pub fn build_auto_press_twiml(digit: char, say_line: Option<&str>) -> String {
    let say = match say_line {
        Some(line) if !line.is_empty() => format!("<Pause length=\"1\"/><Say>{line}</Say>"),
        _ => String::new(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Play digits=\"{digit}\"/>{say}<Hangup/></Response>"
    )
}

/// Build the TwiML for the default-digits variant (§4.9 step 4): play each
/// digit in `digits` in order with an inter-digit pause, then hang up. No
/// removal line — this fires before any phrase is heard.
pub fn build_default_digits_twiml(digits: &str, gap_ms: u64) -> String {
    let gap_secs = gap_ms.div_ceil(1000).max(1);
    let mut body = String::new();
    for digit in digits.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        body.push_str(&format!(
            "<Play digits=\"{digit}\"/><Pause length=\"{gap_secs}\"/>"
        ));
    }
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{body}<Hangup/></Response>")
}
