use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::{
    engine::TickContext,
    models::{AttractionModel, ResidenceAttraction},
    stages::Stage,
    world::{Residence, World},
};

/// Scores every city for every populated residence.
pub struct AttractionStage {
    model: Box<dyn AttractionModel>,
}

impl AttractionStage {
    pub fn new(model: Box<dyn AttractionModel>) -> Self {
        Self { model }
    }
}

fn score_residence(
    model: &dyn AttractionModel,
    world: &World,
    residence: &Residence,
) -> Result<ResidenceAttraction> {
    let unit = world
        .unit(residence.unit)
        .with_context(|| format!("residence refers to unknown unit {:?}", residence.unit))?;
    let origin = model.compute(world, residence.city, unit, None);
    let destinations = world
        .city_ids()
        .filter(|city| *city != residence.city)
        .map(|city| model.compute(world, city, unit, Some(residence.city)))
        .collect();
    Ok(ResidenceAttraction {
        residence: *residence,
        origin,
        destinations,
    })
}

impl Stage for AttractionStage {
    fn name(&self) -> &'static str {
        "attraction"
    }

    fn run(&mut self, ctx: &mut TickContext, world: &mut World) -> Result<()> {
        let world: &World = world;
        let model = self.model.as_ref();
        let results = world
            .residences()
            .par_iter()
            .map(|residence| score_residence(model, world, residence))
            .collect::<Result<Vec<_>>>()?;
        ctx.set_attraction(results);
        Ok(())
    }
}
