//! The OCSP sub-protocol (spec §4.E "OCSP sub-protocol").
//!
//! Walks every adjacent `(cert[i], cert[i+1])` pair in the chain
//! (leaf-first), treating `cert[i+1]` as `cert[i]`'s issuer, and asks the
//! configured (or per-certificate) OCSP responder whether `cert[i]` is
//! still good. The original C engine (`ssl_openssl.c`) has no OCSP code
//! of its own to ground this on — per spec §4.E this logic corrects a
//! known bug in one source variant that advanced the chain index by two
//! per iteration, silently skipping pairs; this implementation walks
//! every `(i, i+1)` pair instead.

use std::time::{Duration, SystemTime};

use boring::hash::MessageDigest;
use boring::pkey::PKey;
use boring::sign::Verifier;
use boring::x509::X509;
use der::{Decode, Encode};
use rand::RngCore;
use sha2::{Digest, Sha256};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::AuthorityInfoAccessSyntax;
use x509_cert::Certificate as CertCert;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus, Request,
    TbsRequest, Version,
};

use crate::config::Config;
use crate::transport::OcspTransport;

const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_PE_AUTHORITY_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.1";
const OID_PKIX_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";
const OID_PKIX_OCSP_NONCE: &str = "1.3.6.1.5.5.7.48.1.2";

/// Runs the OCSP sub-protocol over the whole chain. The verdict is the
/// logical AND over every pair that was actually evaluated; a pair with
/// no reachable responder URI is skipped (neither pass nor fail).
pub(crate) fn check_chain(
    chain: &[X509],
    config: &Config,
    transport: &dyn OcspTransport,
) -> bool {
    if chain.len() < 2 {
        // A lone self-signed/leaf cert has no issuer in the chain to ask
        // about; nothing to check.
        return true;
    }

    let mut verdict = true;
    for pair in chain.windows(2) {
        let (subject, issuer) = (&pair[0], &pair[1]);
        match check_pair(subject, issuer, config, transport) {
            PairOutcome::Pass | PairOutcome::Skipped => {}
            PairOutcome::Fail => verdict = false,
        }
    }
    verdict
}

enum PairOutcome {
    Pass,
    Fail,
    Skipped,
}

fn check_pair(
    subject: &X509,
    issuer: &X509,
    config: &Config,
    transport: &dyn OcspTransport,
) -> PairOutcome {
    let subject_der = match subject.to_der() {
        Ok(d) => d,
        Err(_) => return PairOutcome::Fail,
    };
    let issuer_der = match issuer.to_der() {
        Ok(d) => d,
        Err(_) => return PairOutcome::Fail,
    };

    let subject_cert = match CertCert::from_der(&subject_der) {
        Ok(c) => c,
        Err(_) => return PairOutcome::Fail,
    };
    let issuer_cert = match CertCert::from_der(&issuer_der) {
        Ok(c) => c,
        Err(_) => return PairOutcome::Fail,
    };

    let uri = match responder_uri(&subject_cert).or_else(|| config.ocsp_server.clone()) {
        Some(uri) => uri,
        None => {
            log::debug!("no OCSP responder URI for certificate; skipping");
            return PairOutcome::Skipped;
        }
    };

    let fingerprint = to_hex(&Sha256::digest(&subject_der));
    if let Some(cache) = &config.ocsp_cert_cache {
        if let Some(entry) = cache.get(&fingerprint) {
            if entry.expiry > SystemTime::now() {
                return if entry.valid {
                    PairOutcome::Pass
                } else {
                    PairOutcome::Fail
                };
            }
        }
    }

    let cert_id = match build_cert_id(&subject_cert, &issuer_cert) {
        Some(id) => id,
        None => return PairOutcome::Fail,
    };

    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);

    let request_der = match build_request(cert_id.clone(), &nonce) {
        Some(der) => der,
        None => return PairOutcome::Fail,
    };

    let response_der = match transport.post(&uri, &request_der) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("OCSP request to '{uri}' failed: {e}");
            return PairOutcome::Fail;
        }
    };

    let outcome = match evaluate_response(&response_der, &cert_id, &nonce, issuer) {
        Ok(true) => PairOutcome::Pass,
        Ok(false) => PairOutcome::Fail,
        Err(e) => {
            log::warn!("could not parse OCSP response from '{uri}': {e}");
            PairOutcome::Fail
        }
    };

    if let Some(cache) = &config.ocsp_cert_cache {
        cache.add(crate::db::OcspEntry {
            fingerprint,
            valid: matches!(outcome, PairOutcome::Pass),
            expiry: SystemTime::now() + Duration::from_secs(3600),
        });
    }

    outcome
}

/// Extracts the OCSP responder URI from the subject's Authority
/// Information Access extension (access method `id-ad-ocsp`).
fn responder_uri(subject: &CertCert) -> Option<String> {
    let extensions = subject.tbs_certificate.extensions.as_ref()?;
    let aia_oid = OID_PE_AUTHORITY_INFO_ACCESS.parse().ok()?;
    let ocsp_oid: der::asn1::ObjectIdentifier = OID_AD_OCSP.parse().ok()?;

    for ext in extensions.iter() {
        if ext.extn_id != aia_oid {
            continue;
        }
        let aia = AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes()).ok()?;
        for access in aia.0.iter() {
            if access.access_method != ocsp_oid {
                continue;
            }
            if let GeneralName::UniformResourceIdentifier(uri) = &access.access_location {
                return Some(uri.as_str().to_string());
            }
        }
    }
    None
}

fn build_cert_id(subject: &CertCert, issuer: &CertCert) -> Option<CertId> {
    let issuer_name_der = issuer.tbs_certificate.subject.to_der().ok()?;
    let issuer_name_hash = Sha256::digest(&issuer_name_der).to_vec();

    let issuer_key_bits = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();
    let issuer_key_hash = Sha256::digest(issuer_key_bits).to_vec();

    let serial = subject.tbs_certificate.serial_number.as_bytes().to_vec();

    Some(CertId {
        hash_algorithm: sha256_algorithm_identifier(),
        issuer_name_hash: der::asn1::OctetString::new(issuer_name_hash).ok()?,
        issuer_key_hash: der::asn1::OctetString::new(issuer_key_hash).ok()?,
        serial_number: x509_cert::serial_number::SerialNumber::new(&serial).ok()?,
    })
}

fn sha256_algorithm_identifier() -> x509_ocsp::AlgorithmIdentifier {
    x509_ocsp::AlgorithmIdentifier {
        algorithm: "2.16.840.1.101.3.4.2.1".parse().expect("valid OID"),
        parameters: None,
    }
}

fn build_request(cert_id: CertId, nonce: &[u8]) -> Option<Vec<u8>> {
    let nonce_ext = der::asn1::OctetString::new(nonce.to_vec()).ok()?;
    let nonce_extension = x509_cert::ext::Extension {
        extn_id: OID_PKIX_OCSP_NONCE.parse().ok()?,
        critical: false,
        extn_value: der::asn1::OctetString::new(nonce_ext.to_der().ok()?).ok()?,
    };

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: cert_id,
                single_request_extensions: None,
            }],
            request_extensions: Some(vec![nonce_extension]),
        },
        optional_signature: None,
    };

    request.to_der().ok()
}

/// Decodes `response_der`, checks the outer status, the embedded nonce,
/// this/nextUpdate validity, the per-cert status, and the BasicOCSPResponse
/// signature against `issuer`/`store`.
fn evaluate_response(
    response_der: &[u8],
    cert_id: &CertId,
    nonce: &[u8],
    issuer: &X509,
) -> Result<bool, String> {
    let response =
        OcspResponse::from_der(response_der).map_err(|e| format!("malformed response: {e}"))?;

    if response.response_status != OcspResponseStatus::Successful {
        return Ok(false);
    }

    let body = response
        .response_bytes
        .as_ref()
        .ok_or("successful response with no body")?;

    let expected_basic: der::asn1::ObjectIdentifier =
        OID_PKIX_OCSP_BASIC.parse().map_err(|_| "bad OID")?;
    if body.response_type != expected_basic {
        return Err("unexpected responseType".to_string());
    }

    let basic = BasicOcspResponse::from_der(body.response.as_bytes())
        .map_err(|e| format!("malformed BasicOCSPResponse: {e}"))?;

    if !nonce_matches(&basic, nonce) {
        return Err("nonce mismatch".to_string());
    }

    let single = basic
        .tbs_response_data
        .responses
        .iter()
        .find(|r| &r.cert_id == cert_id)
        .ok_or("no response for our CertID")?;

    match &single.cert_status {
        CertStatus::Good => {}
        CertStatus::Revoked(info) => {
            log::warn!(
                "certificate revoked at {:?}, reason {:?}",
                info.revocation_time,
                info.revocation_reason
            );
            return Ok(false);
        }
        CertStatus::Unknown(_) => {
            log::warn!("OCSP responder reports unknown certificate status");
            return Ok(false);
        }
    }

    let now = SystemTime::now();
    let this_update: SystemTime = single.this_update.to_system_time();
    if this_update > now {
        return Ok(false);
    }
    if let Some(next_update) = single.next_update {
        let next_update: SystemTime = next_update.to_system_time();
        if next_update < now {
            return Ok(false);
        }
    }

    verify_basic_response_signature(&basic, issuer).map_err(|e| e.to_string())
}

fn nonce_matches(basic: &BasicOcspResponse, nonce: &[u8]) -> bool {
    let extensions = match &basic.tbs_response_data.response_extensions {
        Some(exts) => exts,
        None => return false,
    };
    let nonce_oid: der::asn1::ObjectIdentifier = match OID_PKIX_OCSP_NONCE.parse() {
        Ok(oid) => oid,
        Err(_) => return false,
    };
    let ext = match extensions.iter().find(|e| e.extn_id == nonce_oid) {
        Some(ext) => ext,
        None => return false,
    };
    let raw = ext.extn_value.as_bytes();
    if raw == nonce {
        return true;
    }
    // The nonce extnValue is itself a DER OCTET STRING wrapping the raw
    // nonce bytes; some responders echo the outer encoding verbatim.
    der::asn1::OctetString::from_der(raw)
        .map(|inner| inner.as_bytes() == nonce)
        .unwrap_or(false)
}

/// Verifies the BasicOCSPResponse's signature using either an embedded
/// delegated signer certificate (validated against `store`) or, absent
/// one, the issuer's own key (the common "responder == issuer" case).
fn verify_basic_response_signature(
    basic: &BasicOcspResponse,
    issuer: &X509,
) -> Result<bool, &'static str> {
    let tbs_der = basic
        .tbs_response_data
        .to_der()
        .map_err(|_| "could not re-encode tbsResponseData")?;

    let signer_pkey = if let Some(certs) = &basic.certs {
        let signer_der = certs
            .first()
            .ok_or("empty certs list")?
            .to_der()
            .map_err(|_| "bad embedded cert")?;
        let signer = X509::from_der(&signer_der).map_err(|_| "bad embedded cert")?;
        // The embedded "responder cert" is attacker-supplied over plain HTTP
        // (spec §4.E step 4 — no TLS on the OCSP leg); verifying the response's
        // signature against its own key without first checking that the chain
        // issuer actually issued it would let a forged response carrying a
        // self-signed "responder cert" pass as internally consistent. This
        // must reject, not just log, a signer the issuer didn't vouch for.
        if issuer.issued(&signer) != boring::x509::X509VerifyResult::OK {
            return Err("embedded OCSP responder cert is not issued by the chain issuer");
        }
        signer.public_key().map_err(|_| "bad embedded cert key")?
    } else {
        issuer.public_key().map_err(|_| "bad issuer key")?
    };

    verify_signature(&signer_pkey, &tbs_der, basic.signature.raw_bytes())
}

fn verify_signature(pkey: &PKey<boring::pkey::Public>, data: &[u8], signature: &[u8]) -> Result<bool, &'static str> {
    let mut verifier =
        Verifier::new(MessageDigest::sha256(), pkey).map_err(|_| "could not build verifier")?;
    verifier.update(data).map_err(|_| "verifier update failed")?;
    verifier.verify(signature).map_err(|_| "verification failed")
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}
