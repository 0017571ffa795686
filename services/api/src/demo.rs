use crate::infra::{load_catalog, parse_attribute, FileCatalogSource, InMemoryProfileStore};
use clap::Args;
use scheme_finder::eligibility::{
    CatalogSnapshot, CatalogSource, CatalogVersion, EligibilityCache, EligibilityEngine,
    EligibilityError, EligibilityExplanation, EligibilityProfile, EligibilityService, Gender,
    InMemoryEligibilityCache, IncomeBracket, ProfileStore, ProfileUpdate, ProfileValue, SchemeId,
    StateCode, UserId,
};
use scheme_finder::error::AppError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Catalog file (JSON or CSV). Defaults to the bundled seed catalog.
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Age in years (1-120)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=120))]
    pub(crate) age: u8,
    /// Two letter state or union territory code, e.g. GJ
    #[arg(long)]
    pub(crate) state: StateCode,
    /// Male, Female, or Other
    #[arg(long)]
    pub(crate) gender: Gender,
    /// Income bracket code, e.g. BELOW_1_LAKH
    #[arg(long)]
    pub(crate) income_bracket: IncomeBracket,
    /// Extra profile attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attribute)]
    pub(crate) attributes: Vec<(String, ProfileValue)>,
    /// Print matched and unmatched criteria for every scheme
    #[arg(long)]
    pub(crate) explain: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Catalog file (JSON or CSV). Defaults to the bundled seed catalog.
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// User id for the walkthrough profile
    #[arg(long, default_value = "demo-farmer")]
    pub(crate) user: String,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        catalog,
        age,
        state,
        gender,
        income_bracket,
        attributes,
        explain,
    } = args;

    let definitions = load_catalog(catalog.as_ref())?;
    let (snapshot, report) = CatalogSnapshot::build(CatalogVersion(1), definitions);
    for rejected in &report.rejected {
        println!(
            "! skipped scheme {} ({}): {}",
            rejected.scheme_id, rejected.name, rejected.reason
        );
    }

    let profile = EligibilityProfile {
        user_id: UserId("cli".to_string()),
        age,
        state,
        gender,
        income_bracket,
        attributes: attributes.into_iter().collect(),
    };

    let engine = EligibilityEngine::new();
    let eligible = engine.eligible_schemes(&profile, &snapshot);
    println!(
        "{} of {} schemes match (age {}, {}, {}, {})",
        eligible.len(),
        snapshot.len(),
        profile.age,
        profile.state.name(),
        profile.gender,
        profile.income_bracket
    );
    for scheme in &eligible {
        println!("- {} [{}]", scheme.name, scheme.id);
    }

    if explain {
        println!("\nPer-scheme breakdown");
        for scheme in snapshot.schemes() {
            println!("{} [{}]", scheme.name, scheme.id);
            render_explanation(&engine.explain(&profile, &scheme.criteria));
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { catalog, user } = args;
    let user_id = UserId(user);

    let source = Arc::new(FileCatalogSource::new(catalog));
    println!("Scheme finder demo ({})", source.describe());
    let service = EligibilityService::new(
        Arc::new(InMemoryProfileStore::default()),
        source,
        Arc::new(InMemoryEligibilityCache::default()),
    );

    let report = service.reload_catalog()?;
    let snapshot = service.catalog()?;
    println!(
        "- catalog {} loaded at {}: {} schemes, {} rejected",
        report.version,
        snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC"),
        report.loaded,
        report.rejected.len()
    );

    println!("\nSign-in creates a partial profile");
    service.update_profile(
        &user_id,
        ProfileUpdate {
            age: Some(45),
            ..ProfileUpdate::default()
        },
    )?;
    match service.eligible_schemes(&user_id) {
        Err(EligibilityError::ProfileIncomplete { missing, .. }) => {
            let labels: Vec<&str> = missing.iter().map(|field| field.label()).collect();
            println!("- lookup refused until the form is complete: {}", labels.join(", "));
        }
        Err(err) => return Err(err.into()),
        Ok(eligible) => println!("- unexpectedly eligible for {:?}", eligible.names()),
    }

    println!("\nProfile form submitted");
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "occupation".to_string(),
        Some(ProfileValue::Text("farmer".to_string())),
    );
    attributes.insert("land_acres".to_string(), Some(ProfileValue::Number(3.0)));
    service.update_profile(
        &user_id,
        ProfileUpdate {
            state: Some(StateCode::Gujarat),
            gender: Some(Gender::Male),
            income_bracket: Some(IncomeBracket::BelowOneLakh),
            attributes: Some(attributes),
            ..ProfileUpdate::default()
        },
    )?;
    print_eligible(&service, &user_id)?;
    print_eligible(&service, &user_id)?;

    println!("\nMoving to Maharashtra");
    service.update_profile(
        &user_id,
        ProfileUpdate {
            state: Some(StateCode::Maharashtra),
            ..ProfileUpdate::default()
        },
    )?;
    println!("- cache entry is now {:?}", service.cache_state(&user_id)?);
    print_eligible(&service, &user_id)?;

    println!("\nCatalog republished");
    let report = service.reload_catalog()?;
    println!(
        "- catalog {} installed, cache entry is now {:?}",
        report.version,
        service.cache_state(&user_id)?
    );
    print_eligible(&service, &user_id)?;

    let scheme_id = SchemeId("gj-kisan-sahay".to_string());
    match service.explain(&user_id, &scheme_id) {
        Ok(explained) => {
            println!("\nWhy not {}?", explained.scheme_name);
            render_explanation(&explained.explanation);
        }
        Err(EligibilityError::SchemeNotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let stats = service.cache_stats();
    println!(
        "\nCache: {} hits / {} misses ({:.0}% hit rate), {} live entries",
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0,
        stats.entries
    );

    Ok(())
}

fn print_eligible<P, S, C>(
    service: &EligibilityService<P, S, C>,
    user_id: &UserId,
) -> Result<(), EligibilityError>
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    let eligible = service.eligible_schemes(user_id)?;
    let source = if eligible.from_cache {
        "cache"
    } else {
        "computed"
    };
    println!(
        "- {} schemes ({source}, catalog {}): {}",
        eligible.schemes.len(),
        eligible.catalog_version,
        eligible.names().join(", ")
    );
    Ok(())
}

fn render_explanation(explanation: &EligibilityExplanation) {
    for label in &explanation.matched_criteria {
        println!("    + {label}");
    }
    for label in &explanation.unmatched_criteria {
        println!("    - {label}");
    }
}
