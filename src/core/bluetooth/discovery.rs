//! Service, included-service and characteristic discovery.
//! Failures are logged and reported as an empty result.

use anyhow::{anyhow, Result};
use bluest::Characteristic;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::{info, warn};

use crate::core::bluetooth::constants::describe_uuid;
use crate::core::bluetooth::handles::Handles;
use crate::core::bluetooth::lane::BleLane;
use crate::core::central::providers::ServiceDiscoverer;
use crate::core::central::types::{
    CharacteristicProperties, DiscoveredCharacteristic, DiscoveredService, PeripheralId, ServiceKey,
};

pub struct ServiceDiscovery {
    lane: BleLane,
    handles: Handles,
}

/// Maps `bluest` property flags onto the bridge's bitset.
pub(crate) fn convert_properties(flags: bluest::CharacteristicProperties) -> CharacteristicProperties {
    let mut properties = CharacteristicProperties::empty();
    properties.set(CharacteristicProperties::BROADCAST, flags.broadcast);
    properties.set(CharacteristicProperties::READ, flags.read);
    properties.set(CharacteristicProperties::WRITE_WITHOUT_RESPONSE, flags.write_without_response);
    properties.set(CharacteristicProperties::WRITE, flags.write);
    properties.set(CharacteristicProperties::NOTIFY, flags.notify);
    properties.set(CharacteristicProperties::INDICATE, flags.indicate);
    properties.set(CharacteristicProperties::AUTHENTICATED_SIGNED_WRITES, flags.authenticated_signed_writes);
    properties.set(CharacteristicProperties::EXTENDED_PROPERTIES, flags.extended_properties);
    properties
}

/// Collapses a discovery result, logging the failure.
fn or_empty<T>(what: &str, result: Option<Result<Vec<T>>>) -> Vec<T> {
    match result {
        Some(Ok(found)) => found,
        Some(Err(e)) => {
            warn!("{} discovery failed: {}", what, e);
            Vec::new()
        }
        None => Vec::new(),
    }
}

impl ServiceDiscovery {
    pub fn new(lane: BleLane, handles: Handles) -> Self {
        Self { lane, handles }
    }

    async fn describe_characteristic(characteristic: &Characteristic) -> Result<DiscoveredCharacteristic> {
        let id = characteristic.uuid();
        let flags = characteristic.properties().await?;
        Ok(DiscoveredCharacteristic { id, name: describe_uuid(&id), properties: convert_properties(flags) })
    }
}

impl ServiceDiscoverer for ServiceDiscovery {
    fn services(&self, id: &PeripheralId) -> BoxStream<'static, Vec<DiscoveredService>> {
        let device = self.handles.devices.get(id);
        let handles = self.handles.clone();
        let lane = self.lane.clone();
        let id = id.clone();
        stream::once(async move {
            let Some(device) = device else {
                warn!("Device not found with ID: {}", id);
                return Vec::new();
            };
            let found = lane.run(async move { device.discover_services().await.map_err(anyhow::Error::from) }).await;
            let services = or_empty("Service", found);

            handles.clear_services(&id);
            info!("Discovered {} services on {}", services.len(), id);
            services
                .into_iter()
                .map(|service| {
                    let uuid = service.uuid();
                    handles.services.insert(ServiceKey::new(id.clone(), uuid), service);
                    DiscoveredService { id: uuid, name: describe_uuid(&uuid) }
                })
                .collect()
        })
        .boxed()
    }

    fn included_services(&self, key: &ServiceKey) -> BoxStream<'static, Vec<DiscoveredService>> {
        let service = self.handles.services.get(key);
        let handles = self.handles.clone();
        let lane = self.lane.clone();
        let key = key.clone();
        stream::once(async move {
            let Some(service) = service else {
                warn!("Service {} not found on {}", key.service, key.peripheral);
                return Vec::new();
            };
            let found = lane
                .run(async move { service.discover_included_services().await.map_err(anyhow::Error::from) })
                .await;
            or_empty("Included service", found)
                .into_iter()
                .map(|included| {
                    let uuid = included.uuid();
                    handles.services.insert(ServiceKey::new(key.peripheral.clone(), uuid), included);
                    DiscoveredService { id: uuid, name: describe_uuid(&uuid) }
                })
                .collect()
        })
        .boxed()
    }

    fn characteristics(&self, key: &ServiceKey) -> BoxStream<'static, Vec<DiscoveredCharacteristic>> {
        let service = self.handles.services.get(key);
        let handles = self.handles.clone();
        let lane = self.lane.clone();
        let key = key.clone();
        stream::once(async move {
            let Some(service) = service else {
                warn!("Service {} not found on {}", key.service, key.peripheral);
                return Vec::new();
            };
            let found = lane
                .run(async move {
                    let characteristics = service.discover_characteristics().await?;
                    let mut described = Vec::with_capacity(characteristics.len());
                    for characteristic in characteristics {
                        let description = Self::describe_characteristic(&characteristic).await?;
                        described.push((characteristic, description));
                    }
                    Ok::<_, anyhow::Error>(described)
                })
                .await;
            let described = or_empty("Characteristic", found);
            info!("Discovered {} characteristics in {}", described.len(), key.service);
            described
                .into_iter()
                .map(|(characteristic, description)| {
                    handles.characteristics.insert((key.clone(), description.id), characteristic);
                    description
                })
                .collect()
        })
        .boxed()
    }
}
