use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Station reading as published by the charging network map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub uid: i64,
    pub external_id: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub operator_name: Option<String>,
    #[serde(default)]
    pub suboperator_name: Option<String>,
    #[serde(default)]
    pub support_phonenumber: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub evses: Vec<Evse>,
    #[serde(default)]
    pub open_twentyfour_seven: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street_and_number: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evse {
    pub uid: i64,
    pub external_id: String,
    pub evse_id: String,
    pub status: EvseStatus,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvseStatus {
    Available,
    Occupied,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl EvseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub uid: i64,
    pub external_id: String,
    #[serde(default)]
    pub connector_type: Option<String>,
    #[serde(default)]
    pub electrical_properties: Option<ElectricalProperties>,
    #[serde(default)]
    pub fixed_cable: Option<bool>,
    #[serde(default)]
    pub tariff: Option<Tariff>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectricalProperties {
    #[serde(default)]
    pub power_type: Option<String>,
    #[serde(default)]
    pub voltage: Option<u32>,
    #[serde(default)]
    pub amperage: Option<f64>,
    #[serde(default)]
    pub max_electric_power: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    #[serde(default)]
    pub start_fee: Option<f64>,
    #[serde(default)]
    pub per_minute: Option<f64>,
    #[serde(default)]
    pub per_kwh: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Location {
    pub fn primary_evse(&self) -> Option<&Evse> {
        self.evses.first()
    }

    pub fn status(&self) -> Option<EvseStatus> {
        self.primary_evse().map(|evse| evse.status)
    }
}

/// Flattens a reading into the attribute set shown next to the sensor state.
/// Only fields present in the reading are emitted.
pub fn station_attributes(location: &Location) -> Map<String, Value> {
    let mut attributes = Map::new();

    if let Some(address) = &location.address {
        insert_opt(&mut attributes, "address", address.street_and_number.clone());
        insert_opt(&mut attributes, "postal_code", address.postal_code.clone());
        insert_opt(&mut attributes, "city", address.city.clone());
        insert_opt(&mut attributes, "country", address.country.clone());
    }

    if let Some(coordinates) = &location.coordinates {
        attributes.insert("latitude".to_string(), Value::from(coordinates.latitude));
        attributes.insert("longitude".to_string(), Value::from(coordinates.longitude));
    }

    insert_opt(&mut attributes, "operator_name", location.operator_name.clone());
    insert_opt(
        &mut attributes,
        "suboperator_name",
        location.suboperator_name.clone(),
    );
    insert_opt(
        &mut attributes,
        "support_phonenumber",
        location.support_phonenumber.clone(),
    );
    insert_opt(&mut attributes, "open_24_7", location.open_twentyfour_seven);

    let Some(evse) = location.primary_evse() else {
        return attributes;
    };

    attributes.insert("evse_id".to_string(), Value::from(evse.evse_id.clone()));
    insert_opt(&mut attributes, "updated", evse.updated.clone());

    if let Some(connector) = evse.connectors.first() {
        insert_opt(
            &mut attributes,
            "connector_type",
            connector.connector_type.clone(),
        );
        insert_opt(&mut attributes, "fixed_cable", connector.fixed_cable);

        if let Some(electrical) = &connector.electrical_properties {
            insert_opt(
                &mut attributes,
                "connector_power_type",
                electrical.power_type.clone(),
            );
            insert_opt(&mut attributes, "connector_voltage", electrical.voltage);
            insert_opt(&mut attributes, "connector_amperage", electrical.amperage);
            insert_opt(
                &mut attributes,
                "connector_max_power",
                electrical.max_electric_power,
            );
        }

        if let Some(tariff) = &connector.tariff {
            insert_opt(&mut attributes, "tariff_start_fee", tariff.start_fee);
            insert_opt(&mut attributes, "tariff_per_minute", tariff.per_minute);
            insert_opt(&mut attributes, "tariff_per_kwh", tariff.per_kwh);
            insert_opt(&mut attributes, "tariff_currency", tariff.currency.clone());
        }
    }

    attributes
}

fn insert_opt<T: Into<Value>>(attributes: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EvseStatus, Location, station_attributes};

    fn sample_location() -> Location {
        serde_json::from_value(json!({
            "uid": 2_061_322,
            "externalId": "NL-TNM-E01",
            "coordinates": { "latitude": 52.37, "longitude": 4.89 },
            "operatorName": "Shell Recharge",
            "address": {
                "streetAndNumber": "Damrak 1",
                "postalCode": "1012LG",
                "city": "Amsterdam",
                "country": "NLD"
            },
            "evses": [{
                "uid": 1,
                "externalId": "E01-1",
                "evseId": "NL*TNM*E01*1",
                "status": "Occupied",
                "updated": "2026-10-01T10:00:00Z",
                "connectors": [{
                    "uid": 11,
                    "externalId": "E01-1-1",
                    "connectorType": "Type2",
                    "fixedCable": false,
                    "electricalProperties": {
                        "powerType": "AC3Phase",
                        "voltage": 230,
                        "amperage": 16.0,
                        "maxElectricPower": 11.0
                    },
                    "tariff": { "perKwh": 0.39, "currency": "EUR" }
                }]
            }],
            "openTwentyfourSeven": true
        }))
        .expect("sample location should deserialize")
    }

    #[test]
    fn reports_status_of_primary_evse() {
        let location = sample_location();
        assert_eq!(location.status(), Some(EvseStatus::Occupied));
        assert_eq!(location.status().map(EvseStatus::as_str), Some("occupied"));
    }

    #[test]
    fn maps_unrecognized_status_to_unknown() {
        let status: EvseStatus =
            serde_json::from_value(json!("Reserved")).expect("status should deserialize");
        assert_eq!(status, EvseStatus::Unknown);
    }

    #[test]
    fn location_without_evses_has_no_status() {
        let location: Location = serde_json::from_value(json!({
            "uid": 1,
            "externalId": "empty"
        }))
        .expect("minimal location should deserialize");

        assert_eq!(location.status(), None);
        assert!(station_attributes(&location).is_empty());
    }

    #[test]
    fn flattens_address_connector_and_tariff_attributes() {
        let attributes = station_attributes(&sample_location());

        assert_eq!(attributes["city"], "Amsterdam");
        assert_eq!(attributes["latitude"], 52.37);
        assert_eq!(attributes["evse_id"], "NL*TNM*E01*1");
        assert_eq!(attributes["connector_power_type"], "AC3Phase");
        assert_eq!(attributes["connector_max_power"], 11.0);
        assert_eq!(attributes["open_24_7"], true);
        assert!(!attributes.contains_key("tariff_start_fee"));
    }
}
