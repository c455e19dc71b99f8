//! Stand-in population of replicating string genomes.
//!
//! Each update every organism ages and feeds from one environment resource.
//! Organisms past their maximum age die; organisms holding enough energy
//! replicate, splitting their energy with a child whose genome carries
//! per-site substitutions. When the population is at capacity the child
//! replaces a random organism. Every birth and death is reported to the
//! systematics facet.
//!
//! The facet needs handles to the environment and systematics facets, which
//! a restore factory cannot supply, so it is linked to a world explicitly with
//! [`Biota::link`] after the world is built or restored.

use evoworld_core::config::BiotaConfig;
use evoworld_core::facets::systematics::GenotypeId;
use evoworld_core::facets::{
    environment_of, systematics_of, EnvironmentManager, Provider, SystematicsManager,
};
use evoworld_core::{
    reserved, Archive, Context, Facet, FacetError, FacetId, FacetType, PropertyValue, Update,
    World,
};
use rand::Rng;
use std::sync::{Arc, Mutex, RwLock};

pub const BIOTA_TYPE: &str = "evoworld.biota";
const BIOTA_VERSION: u32 = 1;

pub const DATA_POPULATION: &str = "biota.population";
pub const DATA_BIRTHS: &str = "biota.births";
pub const DATA_DEATHS: &str = "biota.deaths";
pub const DATA_MEAN_ENERGY: &str = "biota.mean_energy";

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq)]
pub struct Organism {
    pub genome: String,
    pub genotype: GenotypeId,
    pub energy: f64,
    pub age: u32,
}

#[derive(Debug, Default)]
struct Population {
    organisms: Vec<Organism>,
    births: u64,
    deaths: u64,
}

struct Links {
    environment: Arc<EnvironmentManager>,
    systematics: Arc<SystematicsManager>,
}

pub struct Biota {
    config: BiotaConfig,
    population: Mutex<Population>,
    links: RwLock<Option<Links>>,
}

impl Biota {
    #[must_use]
    pub fn new(config: BiotaConfig) -> Self {
        Self {
            config,
            population: Mutex::new(Population::default()),
            links: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BiotaConfig {
        &self.config
    }

    /// Connects to the world's environment and systematics facets.
    pub fn link(&self, world: &World) -> anyhow::Result<()> {
        let environment = environment_of(world)
            .ok_or_else(|| anyhow::anyhow!("world has no environment facet"))?;
        let systematics = systematics_of(world)
            .ok_or_else(|| anyhow::anyhow!("world has no systematics facet"))?;
        *self.links.write().unwrap_or_else(|e| e.into_inner()) = Some(Links {
            environment,
            systematics,
        });
        Ok(())
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Places the initial population of ancestors. Requires a link.
    pub fn seed_population(&self) -> anyhow::Result<usize> {
        let links = self.links.read().unwrap_or_else(|e| e.into_inner());
        let links = links
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("biota is not linked to a world"))?;
        let mut population = self.population.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..self.config.initial_population {
            let genotype = links
                .systematics
                .classify(&self.config.ancestor_genome, None);
            population.organisms.push(Organism {
                genome: self.config.ancestor_genome.clone(),
                genotype,
                energy: 0.0,
                age: 0,
            });
            population.births += 1;
        }
        Ok(population.organisms.len())
    }

    #[must_use]
    pub fn population(&self) -> usize {
        self.population
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .organisms
            .len()
    }

    #[must_use]
    pub fn organisms(&self) -> Vec<Organism> {
        self.population
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .organisms
            .clone()
    }

    #[must_use]
    pub fn births(&self) -> u64 {
        self.population.lock().unwrap_or_else(|e| e.into_inner()).births
    }

    #[must_use]
    pub fn deaths(&self) -> u64 {
        self.population.lock().unwrap_or_else(|e| e.into_inner()).deaths
    }

    fn mutate<R: Rng>(&self, genome: &str, rng: &mut R) -> String {
        genome
            .bytes()
            .map(|site| {
                if rng.gen_bool(self.config.mutation_rate) {
                    ALPHABET[rng.gen_range(0..ALPHABET.len())] as char
                } else {
                    site as char
                }
            })
            .collect()
    }

    fn step<R: Rng>(&self, links: &Links, rng: &mut R) {
        let mut population = self.population.lock().unwrap_or_else(|e| e.into_inner());
        let cfg = &self.config;

        for organism in population.organisms.iter_mut() {
            organism.age += 1;
            organism.energy += links.environment.consume(&cfg.resource, cfg.consumption);
        }

        let before = population.organisms.len();
        population.organisms.retain(|o| {
            let alive = o.age <= cfg.max_age;
            if !alive {
                links.systematics.remove_organism(o.genotype);
            }
            alive
        });
        let died = before - population.organisms.len();
        population.deaths += died as u64;

        let parents: Vec<usize> = population
            .organisms
            .iter()
            .enumerate()
            .filter(|(_, o)| o.energy >= cfg.replication_cost)
            .map(|(i, _)| i)
            .collect();
        for index in parents {
            let (genome, parent_genotype) = {
                let parent = &mut population.organisms[index];
                parent.energy /= 2.0;
                (parent.genome.clone(), parent.genotype)
            };
            let child_genome = self.mutate(&genome, rng);
            let genotype = links.systematics.classify(&child_genome, Some(parent_genotype));
            let child = Organism {
                genome: child_genome,
                genotype,
                energy: population.organisms[index].energy,
                age: 0,
            };
            population.births += 1;

            if population.organisms.len() < cfg.capacity {
                population.organisms.push(child);
            } else {
                let victim = rng.gen_range(0..population.organisms.len());
                let replaced = std::mem::replace(&mut population.organisms[victim], child);
                links.systematics.remove_organism(replaced.genotype);
                population.deaths += 1;
            }
        }
    }
}

impl Facet for Biota {
    fn facet_type(&self) -> &str {
        BIOTA_TYPE
    }

    fn update_before(&self) -> FacetId {
        reserved::data_manager()
    }

    fn update_after(&self) -> FacetId {
        reserved::environment()
    }

    fn perform_update(&self, ctx: &mut Context, update: Update) {
        let links = self.links.read().unwrap_or_else(|e| e.into_inner());
        match links.as_ref() {
            Some(links) => self.step(links, ctx.rng()),
            None => ctx
                .feedback_mut()
                .warning(&format!("biota is not linked, skipping update {update}")),
        }
    }

    fn serialize(&self, archive: &mut dyn Archive) -> evoworld_core::Result<()> {
        archive.set_version(BIOTA_VERSION);
        let cfg = &self.config;
        archive.put("initial_population", cfg.initial_population)?;
        archive.put("capacity", cfg.capacity)?;
        archive.put("replication_cost", cfg.replication_cost)?;
        archive.put("resource", cfg.resource.as_str())?;
        archive.put("consumption", cfg.consumption)?;
        archive.put("max_age", i64::from(cfg.max_age))?;
        archive.put("mutation_rate", cfg.mutation_rate)?;
        archive.put("ancestor_genome", cfg.ancestor_genome.as_str())?;

        let population = self.population.lock().unwrap_or_else(|e| e.into_inner());
        archive.put("births", population.births)?;
        archive.put("deaths", population.deaths)?;
        archive.put("organisms", population.organisms.len())?;
        for (i, organism) in population.organisms.iter().enumerate() {
            let child = archive.child(&i.to_string())?;
            child.put("genome", organism.genome.as_str())?;
            child.put("genotype", organism.genotype)?;
            child.put("energy", organism.energy)?;
            child.put("age", i64::from(organism.age))?;
        }
        Ok(())
    }
}

fn non_negative<T: TryFrom<i64>>(archive: &dyn Archive, key: &str) -> evoworld_core::Result<T> {
    let value = archive.require_int(key)?;
    T::try_from(value).map_err(|_| FacetError::archive(format!("`{key}` is out of range: {value}")))
}

impl FacetType for Biota {
    const TYPE_NAME: &'static str = BIOTA_TYPE;

    fn restore(archive: &dyn Archive) -> evoworld_core::Result<Self> {
        archive.expect_type(BIOTA_TYPE, BIOTA_VERSION)?;
        let config = BiotaConfig {
            initial_population: non_negative(archive, "initial_population")?,
            capacity: non_negative(archive, "capacity")?,
            replication_cost: archive.require_float("replication_cost")?,
            resource: archive.require_str("resource")?.to_string(),
            consumption: archive.require_float("consumption")?,
            max_age: non_negative(archive, "max_age")?,
            mutation_rate: archive.require_float("mutation_rate")?,
            ancestor_genome: archive.require_str("ancestor_genome")?.to_string(),
        };
        config
            .validate()
            .map_err(|e| FacetError::archive(format!("biota parameters rejected: {e}")))?;

        let count: usize = non_negative(archive, "organisms")?;
        let mut organisms = Vec::with_capacity(count);
        for i in 0..count {
            let child = archive.require_sub_object(&i.to_string())?;
            organisms.push(Organism {
                genome: child.require_str("genome")?.to_string(),
                genotype: non_negative(child, "genotype")?,
                energy: child.require_float("energy")?,
                age: non_negative(child, "age")?,
            });
        }

        let biota = Self::new(config);
        *biota.population.lock().unwrap_or_else(|e| e.into_inner()) = Population {
            organisms,
            births: non_negative(archive, "births")?,
            deaths: non_negative(archive, "deaths")?,
        };
        Ok(biota)
    }
}

impl Provider for Biota {
    fn provides(&self) -> Vec<String> {
        [DATA_POPULATION, DATA_BIRTHS, DATA_DEATHS, DATA_MEAN_ENERGY]
            .iter()
            .map(|id| (*id).to_string())
            .collect()
    }

    fn provided_value(&self, data_id: &str) -> Option<PropertyValue> {
        let population = self.population.lock().unwrap_or_else(|e| e.into_inner());
        match data_id {
            DATA_POPULATION => Some(population.organisms.len().into()),
            DATA_BIRTHS => Some(population.births.into()),
            DATA_DEATHS => Some(population.deaths.into()),
            DATA_MEAN_ENERGY => {
                let n = population.organisms.len();
                let total: f64 = population.organisms.iter().map(|o| o.energy).sum();
                Some(PropertyValue::Float(if n == 0 { 0.0 } else { total / n as f64 }))
            }
            _ => None,
        }
    }

    fn describe_provided_value(&self, data_id: &str) -> String {
        match data_id {
            DATA_POPULATION => "Number of living organisms",
            DATA_BIRTHS => "Organisms born since the run started",
            DATA_DEATHS => "Organisms died since the run started",
            DATA_MEAN_ENERGY => "Mean stored energy per organism",
            _ => "",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evoworld_core::MemoryArchive;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type Linked = (
        World,
        Arc<Biota>,
        Arc<EnvironmentManager>,
        Arc<SystematicsManager>,
    );

    fn linked_world(config: BiotaConfig) -> Linked {
        let mut world = World::new();
        let env = Arc::new(EnvironmentManager::new());
        env.define_resource(&config.resource, 1000.0, 0.0, 0.0);
        let sys = Arc::new(SystematicsManager::default());
        let biota = Arc::new(Biota::new(config));
        world.attach_facet(reserved::ENVIRONMENT, env.clone()).unwrap();
        world.attach_facet(reserved::SYSTEMATICS, sys.clone()).unwrap();
        world.attach_facet("biota", biota.clone()).unwrap();
        biota.link(&world).unwrap();
        (world, biota, env, sys)
    }

    #[test]
    fn test_runs_after_environment() {
        let (world, ..) = linked_world(BiotaConfig::default());
        let order: Vec<String> = world
            .update_order()
            .iter()
            .map(|id| id.to_string())
            .collect();
        let env = order.iter().position(|id| id == "environment").unwrap();
        let biota = order.iter().position(|id| id == "biota").unwrap();
        assert!(env < biota);
    }

    #[test]
    fn test_seed_requires_link() {
        let biota = Biota::new(BiotaConfig::default());
        assert!(biota.seed_population().is_err());
        assert!(biota.link(&World::new()).is_err());
    }

    #[test]
    fn test_seed_classifies_ancestors() {
        let config = BiotaConfig {
            initial_population: 5,
            ..Default::default()
        };
        let (_, biota, _, sys) = linked_world(config);
        assert_eq!(biota.seed_population().unwrap(), 5);
        assert_eq!(sys.active_count(), 1);
        assert_eq!(sys.dominant().unwrap().abundance, 5);
    }

    #[test]
    fn test_feeding_and_replication() {
        let config = BiotaConfig {
            initial_population: 2,
            capacity: 10,
            replication_cost: 2.0,
            consumption: 1.0,
            mutation_rate: 0.0,
            ..Default::default()
        };
        let (world, biota, env, sys) = linked_world(config);
        biota.seed_population().unwrap();
        let mut ctx = Context::new(1);

        world.perform_update(&mut ctx, Update::new(0));
        assert_eq!(biota.population(), 2);
        assert_eq!(env.amount("glucose"), Some(998.0));

        world.perform_update(&mut ctx, Update::new(1));
        assert_eq!(biota.population(), 4);
        assert_eq!(biota.births(), 4);
        // no mutation, so every child joins the ancestor genotype
        assert_eq!(sys.active_count(), 1);
    }

    #[test]
    fn test_capacity_replaces_organisms() {
        let config = BiotaConfig {
            initial_population: 3,
            capacity: 3,
            replication_cost: 1.0,
            mutation_rate: 0.0,
            ..Default::default()
        };
        let (world, biota, ..) = linked_world(config);
        biota.seed_population().unwrap();
        let mut ctx = Context::new(9);
        world.perform_update(&mut ctx, Update::new(0));
        assert_eq!(biota.population(), 3);
        assert_eq!(biota.deaths(), 3);
    }

    #[test]
    fn test_old_organisms_die() {
        let config = BiotaConfig {
            initial_population: 4,
            max_age: 1,
            replication_cost: 1000.0,
            ..Default::default()
        };
        let (world, biota, _, sys) = linked_world(config);
        biota.seed_population().unwrap();
        let mut ctx = Context::new(3);
        world.perform_update(&mut ctx, Update::new(0));
        assert_eq!(biota.population(), 4);
        world.perform_update(&mut ctx, Update::new(1));
        assert_eq!(biota.population(), 0);
        assert_eq!(biota.deaths(), 4);
        assert_eq!(sys.active_count(), 0);
    }

    #[test]
    fn test_unlinked_update_warns() {
        let biota = Biota::new(BiotaConfig::default());
        let mut ctx = Context::default();
        biota.perform_update(&mut ctx, Update::new(0));
        assert_eq!(ctx.feedback().warning_count(), 1);
    }

    #[test]
    fn test_zero_mutation_rate_copies_genome() {
        let biota = Biota::new(BiotaConfig {
            mutation_rate: 0.0,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert_eq!(biota.mutate("abcd", &mut rng), "abcd");
    }

    #[test]
    fn test_serialize_restore() {
        let (world, biota, ..) = linked_world(BiotaConfig {
            initial_population: 3,
            ..Default::default()
        });
        biota.seed_population().unwrap();
        let mut ctx = Context::new(11);
        for u in 0..5 {
            world.perform_update(&mut ctx, Update::new(u));
        }

        let mut archive = MemoryArchive::new("biota");
        archive.set_object_type(BIOTA_TYPE);
        biota.serialize(&mut archive).unwrap();
        let restored = Biota::restore(&archive).unwrap();
        assert_eq!(restored.organisms(), biota.organisms());
        assert_eq!(restored.births(), biota.births());
        assert_eq!(restored.config().capacity, biota.config().capacity);
        assert!(!restored.is_linked());
    }

    fn archive_with(config: BiotaConfig) -> MemoryArchive {
        let mut archive = MemoryArchive::new("biota");
        archive.set_object_type(BIOTA_TYPE);
        Biota::new(config).serialize(&mut archive).unwrap();
        archive
    }

    #[test]
    fn test_restore_rejects_out_of_range_parameters() {
        let bad_rate = archive_with(BiotaConfig {
            mutation_rate: 1.5,
            ..Default::default()
        });
        assert!(matches!(
            Biota::restore(&bad_rate),
            Err(FacetError::Archive(_))
        ));

        let no_room = archive_with(BiotaConfig {
            capacity: 0,
            initial_population: 0,
            ..Default::default()
        });
        assert!(matches!(
            Biota::restore(&no_room),
            Err(FacetError::Archive(_))
        ));

        assert!(Biota::restore(&archive_with(BiotaConfig::default())).is_ok());
    }

    #[test]
    fn test_provided_values() {
        let (_, biota, ..) = linked_world(BiotaConfig {
            initial_population: 2,
            ..Default::default()
        });
        biota.seed_population().unwrap();
        assert_eq!(
            biota.provided_value(DATA_POPULATION),
            Some(PropertyValue::Int(2))
        );
        assert_eq!(
            biota.provided_value(DATA_MEAN_ENERGY),
            Some(PropertyValue::Float(0.0))
        );
        assert_eq!(biota.provided_value("other"), None);
    }
}
