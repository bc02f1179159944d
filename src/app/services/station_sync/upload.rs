//! Mirroring cached metadata and observations into the entity store

use super::{OntologyLookup, StationSync, UploadOutcome, UploadReport};
use crate::app::models::{DatastreamDescriptor, Observation, RemoteRef, StationMetadata};
use crate::app::services::entity_reconciler::{
    EntityKind, EntityReconciler, LocalEntity, ReconcileOutcome,
};
use crate::constants::{
    DEFAULT_OBSERVATION_TYPE, GEOJSON_ENCODING, SENSOR_ENCODING, metadata_keys,
};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use indicatif::ProgressBar;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use tracing::{Instrument, debug, info, warn};

impl StationSync {
    /// Mirror the station's Thing, Location and datastreams
    ///
    /// Thing and Location failures abort the upload. A datastream the store
    /// rejects is reported as failed and the rest continue. Every remote link
    /// obtained is written back into the cached metadata.
    pub async fn upload_metadata(
        &mut self,
        reconciler: &EntityReconciler,
        ontology: &dyn OntologyLookup,
    ) -> Result<UploadReport> {
        let span = self.span.clone();
        self.mirror_metadata(reconciler, ontology)
            .instrument(span)
            .await
    }

    async fn mirror_metadata(
        &mut self,
        reconciler: &EntityReconciler,
        ontology: &dyn OntologyLookup,
    ) -> Result<UploadReport> {
        let metadata = self.metadata.get();
        let mut report = UploadReport::default();

        let thing = reconciler.reconcile(&self.thing_entity(&metadata)).await?;
        let thing_ref = thing.remote().clone();
        self.metadata
            .set(metadata_keys::THING, serde_json::to_value(&thing_ref)?)?;
        report.record(&UploadOutcome::Mirrored(thing));

        match location_entity(&metadata, self.station_name(&metadata)) {
            Some(location) => {
                let outcome = reconciler
                    .reconcile(&location.under(thing_ref.clone()))
                    .await?;
                self.metadata
                    .set(metadata_keys::LOCATION, serde_json::to_value(outcome.remote())?)?;
                report.record(&UploadOutcome::Mirrored(outcome));
            }
            None => {
                warn!("Station has no coordinates; Location not mirrored");
                report.record(&UploadOutcome::Unavailable(
                    "station has no coordinates".to_string(),
                ));
            }
        }

        let mut mirrored = Vec::new();
        for datastream in metadata.datastreams()? {
            let datastream = self
                .mirror_datastream(reconciler, ontology, &metadata, &thing_ref, datastream, &mut report)
                .await?;
            mirrored.push(datastream);
        }
        let snapshot = self.metadata.merge_datastreams(mirrored)?;
        self.matches.ensure_current(&snapshot)?;

        info!(
            "Metadata mirrored: {} created, {} reused, {} updated, {} unavailable, {} failed",
            report.created, report.reused, report.updated, report.unavailable, report.failed
        );
        Ok(report)
    }

    /// Sensor, ObservedProperty and Datastream for one descriptor
    ///
    /// Returns the descriptor with whatever remote links were obtained.
    async fn mirror_datastream(
        &self,
        reconciler: &EntityReconciler,
        ontology: &dyn OntologyLookup,
        metadata: &StationMetadata,
        thing: &RemoteRef,
        mut datastream: DatastreamDescriptor,
        report: &mut UploadReport,
    ) -> Result<DatastreamDescriptor> {
        let Some(property) = ontology.describe(&datastream).await? else {
            warn!(
                "No observed property description for '{}'; datastream not mirrored",
                datastream.name
            );
            report.record(&UploadOutcome::Unavailable(format!(
                "no observed property for '{}'",
                datastream.name
            )));
            return Ok(datastream);
        };

        let sensor = LocalEntity::new(
            EntityKind::Sensor,
            attributes(json!({
                "name": format!("{} {}", self.station_name(metadata), datastream.name),
                "description": datastream.description_or_name(),
                "encodingType": SENSOR_ENCODING,
                "metadata": self.key.to_string(),
            })),
        );
        let Some(sensor) = settle(reconciler.reconcile(&sensor).await, report)? else {
            return Ok(datastream);
        };

        let observed_property = LocalEntity::new(
            EntityKind::ObservedProperty,
            attributes(json!({
                "name": property.name,
                "definition": property.definition,
                "description": property.description,
            })),
        );
        let Some(observed_property) =
            settle(reconciler.reconcile(&observed_property).await, report)?
        else {
            return Ok(datastream);
        };

        let observation_type = datastream
            .extra
            .get("observationType")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_OBSERVATION_TYPE)
            .to_string();
        let remote = LocalEntity::new(
            EntityKind::Datastream,
            attributes(json!({
                "name": datastream.name,
                "description": datastream.description_or_name(),
                "observationType": observation_type,
                "unitOfMeasurement": serde_json::to_value(&property.unit)?,
                "Sensor": sensor.as_link(),
                "ObservedProperty": observed_property.as_link(),
            })),
        )
        .under(thing.clone());

        datastream.sensor = Some(sensor);
        datastream.observed_property = Some(observed_property);
        if let Some(remote) = settle(reconciler.reconcile(&remote).await, report)? {
            datastream.remote = Some(remote);
        }
        Ok(datastream)
    }

    /// Mirror cached observations with timestamps in `[start, end]`
    ///
    /// Observations whose property maps to no datastream, or to one not yet
    /// mirrored, are dropped with a warning and counted as unavailable.
    pub async fn upload_observations(
        &mut self,
        reconciler: &EntityReconciler,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        progress: Option<&ProgressBar>,
    ) -> Result<UploadReport> {
        let span = self.span.clone();
        self.mirror_observations(reconciler, start, end, progress)
            .instrument(span)
            .await
    }

    async fn mirror_observations(
        &mut self,
        reconciler: &EntityReconciler,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        progress: Option<&ProgressBar>,
    ) -> Result<UploadReport> {
        let metadata = self.metadata.get();
        self.matches.ensure_current(&metadata)?;

        let remotes: HashMap<String, RemoteRef> = metadata
            .datastreams()?
            .into_iter()
            .filter_map(|d| d.remote.map(|remote| (d.name, remote)))
            .collect();

        let observations = self.observations.get_all_in_range(start, end)?;
        if let Some(pb) = progress {
            pb.set_length(observations.len() as u64);
        }

        let mut report = UploadReport::default();
        let mut warned = HashSet::new();
        for (index, observation) in observations.iter().enumerate() {
            let outcome = self
                .mirror_observation(reconciler, &remotes, observation, &mut warned)
                .await?;
            report.record(&outcome);

            if let Some(pb) = progress {
                pb.set_position(index as u64 + 1);
            }
        }

        info!(
            "{} observations mirrored, {} unavailable, {} failed",
            report.mirrored(),
            report.unavailable,
            report.failed
        );
        Ok(report)
    }

    async fn mirror_observation(
        &mut self,
        reconciler: &EntityReconciler,
        remotes: &HashMap<String, RemoteRef>,
        observation: &Observation,
        warned: &mut HashSet<String>,
    ) -> Result<UploadOutcome> {
        let Some(datastream) = self.matches.resolve(&observation.property) else {
            let reason = format!("property '{}' matches no datastream", observation.property);
            if warned.insert(observation.property.clone()) {
                warn!("Dropping observations: {}", reason);
            }
            return Ok(UploadOutcome::Unavailable(reason));
        };

        let Some(parent) = remotes.get(&datastream) else {
            let reason = format!("datastream '{}' is not mirrored yet", datastream);
            if warned.insert(datastream.clone()) {
                warn!("Dropping observations: {}", reason);
            }
            return Ok(UploadOutcome::Unavailable(reason));
        };

        let entity = LocalEntity::new(
            EntityKind::Observation,
            attributes(json!({
                "phenomenonTime": observation
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                "result": observation.result.to_json(),
            })),
        )
        .under(parent.clone());

        match reconciler.reconcile(&entity).await {
            Ok(outcome) => {
                debug!("{} {}", observation.key(), outcome);
                Ok(UploadOutcome::Mirrored(outcome))
            }
            Err(e) => Ok(UploadOutcome::Failed(entity_failure(e)?)),
        }
    }

    fn thing_entity(&self, metadata: &StationMetadata) -> LocalEntity {
        let name = self.station_name(metadata);
        let mut properties = metadata
            .get(metadata_keys::PROPERTIES)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        properties
            .entry("provider")
            .or_insert_with(|| json!(self.key.provider));
        properties
            .entry("station")
            .or_insert_with(|| json!(self.key.station));

        LocalEntity::new(
            EntityKind::Thing,
            attributes(json!({
                "name": name,
                "description": metadata.description().unwrap_or(name),
                "properties": properties,
            })),
        )
    }

    fn station_name<'a>(&'a self, metadata: &'a StationMetadata) -> &'a str {
        metadata.name().unwrap_or(&self.key.station)
    }
}

fn location_entity(metadata: &StationMetadata, name: &str) -> Option<LocalEntity> {
    let latitude = metadata.latitude()?;
    let longitude = metadata.longitude()?;

    Some(LocalEntity::new(
        EntityKind::Location,
        attributes(json!({
            "name": name,
            "description": metadata.description().unwrap_or(name),
            "encodingType": GEOJSON_ENCODING,
            "location": {"type": "Point", "coordinates": [longitude, latitude]},
        })),
    ))
}

fn attributes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Record the outcome of one dependent entity, yielding its link on success
fn settle(
    result: Result<ReconcileOutcome>,
    report: &mut UploadReport,
) -> Result<Option<RemoteRef>> {
    match result {
        Ok(outcome) => {
            let remote = outcome.remote().clone();
            report.record(&UploadOutcome::Mirrored(outcome));
            Ok(Some(remote))
        }
        Err(e) => {
            report.record(&UploadOutcome::Failed(entity_failure(e)?));
            Ok(None)
        }
    }
}

/// Transport failures abort the cycle; anything else fails one entity
fn entity_failure(error: Error) -> Result<String> {
    if error.is_retryable() {
        return Err(error);
    }
    warn!("Entity not mirrored: {}", error);
    Ok(error.to_string())
}
