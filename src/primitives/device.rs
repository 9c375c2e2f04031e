//! Device identification data embedded into three-legged tokens.
use serde::{Deserialize, Serialize};

/// An immutable copy of the identifying fields of an end-user device.
///
/// The snapshot is captured when a three-legged token is issued and travels
/// inside the signed token payload, it is not a live reference to any device
/// record. Consumers such as the location services read it back through
/// `Issuer::device_from_token` so that the client does not have to resupply
/// identifiers on every request.
///
/// At least one of the identifiers must be present. The field names below
/// follow the camelCase wire format of the gateway APIs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Phone number in E.164 format, e.g. `+123456789`.
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,

    /// Network access identifier, e.g. `123456789@domain.com`.
    #[serde(rename = "networkAccessIdentifier")]
    pub network_access_identifier: Option<String>,

    /// IPv4 address information as observed by the application server.
    #[serde(rename = "ipv4Address")]
    pub ipv4_address: Option<DeviceIpv4Addr>,

    /// IPv6 address of the device.
    #[serde(rename = "ipv6Address")]
    pub ipv6_address: Option<String>,
}

/// The IPv4 address information identifying a device.
///
/// The public (observed) address must always be given. Since mobile devices
/// can in general not be identified by a public address alone, at least one
/// of the private address or the public port should accompany it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIpv4Addr {
    /// Public IPv4 address as seen by the application server.
    #[serde(rename = "publicAddress")]
    pub public_address: String,

    /// Private (local) IPv4 address in use by the device.
    #[serde(rename = "privateAddress")]
    pub private_address: Option<String>,

    /// TCP or UDP port number observed together with the public address.
    #[serde(rename = "publicPort")]
    pub public_port: Option<u16>,
}

impl DeviceSnapshot {
    /// Whether any identifier is present at all.
    ///
    /// An empty snapshot identifies nothing and is rejected at issuance.
    pub fn has_identifier(&self) -> bool {
        self.phone_number.is_some()
            || self.network_access_identifier.is_some()
            || self.ipv4_address.is_some()
            || self.ipv6_address.is_some()
    }
}
