use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GeoValue};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::stats::EmissionPolygons;

/// Emission polygons as a GeoJSON feature collection in their projected CRS.
pub fn polygons_to_geojson(emissions: &EmissionPolygons) -> GeoJson {
    let features = emissions
        .features
        .iter()
        .map(|f| {
            let mut properties = JsonMap::new();
            properties.insert("change_id".to_string(), json!(f.change_id));
            properties.insert("class_before".to_string(), json!(f.class_before));
            properties.insert("class_after".to_string(), json!(f.class_after));
            properties.insert("change".to_string(), json!(f.label()));
            properties.insert("emission_factor".to_string(), json!(f.emission_factor));
            properties.insert("area_ha".to_string(), json!(f.area_ha()));
            properties.insert("emissions".to_string(), json!(f.emissions));
            properties.insert("color".to_string(), json!(f.color.to_hex()));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(GeoValue::from(&f.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut crs = JsonMap::new();
    crs.insert("type".to_string(), json!("name"));
    crs.insert(
        "properties".to_string(),
        json!({ "name": emissions.crs.to_string() }),
    );
    let mut foreign_members = JsonMap::new();
    foreign_members.insert("crs".to_string(), JsonValue::Object(crs));

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    })
}

pub fn write_polygons_geojson(emissions: &EmissionPolygons, output_path: &Path) -> Result<()> {
    tracing::info!(
        "Writing {} emission polygons to {:?}",
        emissions.features.len(),
        output_path
    );
    let geojson = polygons_to_geojson(emissions).to_string();
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;
    file.write_all(geojson.as_bytes())
        .context("Failed to write GeoJSON")?;
    Ok(())
}
