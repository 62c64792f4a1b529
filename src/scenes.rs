use serde::Serialize;

/// Appended to every prompt so the model edits the surroundings, not the product.
const PRESERVE_PRODUCT_INSTRUCTION: &str = "Keep the uploaded product exactly as it is (shape, color, logo and proportions) and build the new scene around it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    Studio,
    Lifestyle,
    Outdoor,
    Creative,
}

impl Scene {
    const ALL: [Scene; 4] = [
        Scene::Studio,
        Scene::Lifestyle,
        Scene::Outdoor,
        Scene::Creative,
    ];

    pub fn all() -> &'static [Scene] {
        &Self::ALL
    }

    pub fn id(self) -> &'static str {
        match self {
            Scene::Studio => "studio",
            Scene::Lifestyle => "lifestyle",
            Scene::Outdoor => "outdoor",
            Scene::Creative => "creative",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scene::Studio => "Studio",
            Scene::Lifestyle => "Lifestyle",
            Scene::Outdoor => "Outdoor",
            Scene::Creative => "Creative",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scene::Studio => "Product in a clean white studio background, soft lighting, professional e-commerce photo.",
            Scene::Lifestyle => "Product being used by people in a natural indoor home setting with warm light.",
            Scene::Outdoor => "Product in a bright outdoor park or travel setting, with natural daylight and greenery.",
            Scene::Creative => "Product in an artistic, bold, colorful, creative advertising style composition.",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Scene::Studio => "professional product photography, clean white studio background, soft lighting, sharp focus, high detail, e-commerce style",
            Scene::Lifestyle => "lifestyle product photography, natural indoor home setting, warm lighting, people using the product, cozy atmosphere, realistic",
            Scene::Outdoor => "outdoor product photography, bright natural daylight, park setting, greenery, travel vibe, natural background",
            Scene::Creative => "creative advertising photography, artistic composition, bold colors, dramatic lighting, innovative, eye-catching, professional product shot",
        }
    }

    pub fn parse(value: &str) -> Option<Scene> {
        let lowered = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|scene| scene.id() == lowered)
    }

    /// Unknown or missing ids fall back to [`Scene::Studio`].
    pub fn resolve(value: Option<&str>) -> Scene {
        value.and_then(Scene::parse).unwrap_or(Scene::Studio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demographic {
    None,
    Women,
    Men,
    Teens,
    Kids,
    Seniors,
    Diverse,
}

impl Demographic {
    const ALL: [Demographic; 7] = [
        Demographic::None,
        Demographic::Women,
        Demographic::Men,
        Demographic::Teens,
        Demographic::Kids,
        Demographic::Seniors,
        Demographic::Diverse,
    ];

    pub fn all() -> &'static [Demographic] {
        &Self::ALL
    }

    pub fn id(self) -> &'static str {
        match self {
            Demographic::None => "none",
            Demographic::Women => "women",
            Demographic::Men => "men",
            Demographic::Teens => "teens",
            Demographic::Kids => "kids",
            Demographic::Seniors => "seniors",
            Demographic::Diverse => "diverse",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Demographic::None => "Product only",
            Demographic::Women => "Women",
            Demographic::Men => "Men",
            Demographic::Teens => "Teens",
            Demographic::Kids => "Kids",
            Demographic::Seniors => "Seniors",
            Demographic::Diverse => "Diverse group",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Demographic::None => "No human model, the product is the only subject.",
            Demographic::Women => "An adult woman presenting or using the product.",
            Demographic::Men => "An adult man presenting or using the product.",
            Demographic::Teens => "A teenager presenting or using the product.",
            Demographic::Kids => "A child presenting or using the product, family friendly.",
            Demographic::Seniors => "An older adult presenting or using the product.",
            Demographic::Diverse => "A small group of people of different ages and backgrounds.",
        }
    }

    fn model_phrase(self) -> Option<&'static str> {
        match self {
            Demographic::None => None,
            Demographic::Women => Some("a young adult female model naturally holding or using the product"),
            Demographic::Men => Some("a young adult male model naturally holding or using the product"),
            Demographic::Teens => Some("a cheerful teenage model holding or using the product"),
            Demographic::Kids => Some("a happy child model holding or playing with the product, family friendly"),
            Demographic::Seniors => Some("a confident senior model in their sixties holding or using the product"),
            Demographic::Diverse => Some("a diverse group of models of different ages and ethnicities interacting with the product"),
        }
    }

    pub fn parse(value: &str) -> Option<Demographic> {
        let lowered = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|variant| variant.id() == lowered)
    }

    /// Unknown or missing ids fall back to [`Demographic::None`].
    pub fn resolve(value: Option<&str>) -> Demographic {
        value.and_then(Demographic::parse).unwrap_or(Demographic::None)
    }
}

pub fn select_prompt(scene: Scene, demographic: Demographic) -> String {
    match demographic.model_phrase() {
        Some(phrase) => format!(
            "{}, featuring {}. {}",
            scene.prompt(),
            phrase,
            PRESERVE_PRODUCT_INSTRUCTION
        ),
        None => format!("{}. {}", scene.prompt(), PRESERVE_PRODUCT_INSTRUCTION),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn scene_catalog() -> Vec<CatalogEntry> {
    Scene::all()
        .iter()
        .map(|scene| CatalogEntry {
            id: scene.id(),
            name: scene.name(),
            description: scene.description(),
        })
        .collect()
}

pub fn demographic_catalog() -> Vec<CatalogEntry> {
    Demographic::all()
        .iter()
        .map(|variant| CatalogEntry {
            id: variant.id(),
            name: variant.name(),
            description: variant.description(),
        })
        .collect()
}
