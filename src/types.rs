use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reference genome build a position is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssemblyId {
    #[serde(rename = "GRCh38")]
    Grch38,
    #[serde(rename = "GRCh37")]
    Grch37,
    #[serde(rename = "NCBI36")]
    Ncbi36,
    #[serde(rename = "Other")]
    Other,
}

impl AssemblyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyId::Grch38 => "GRCh38",
            AssemblyId::Grch37 => "GRCh37",
            AssemblyId::Ncbi36 => "NCBI36",
            AssemblyId::Other => "Other",
        }
    }
}

impl fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssemblyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grch38" => Ok(AssemblyId::Grch38),
            "grch37" => Ok(AssemblyId::Grch37),
            "ncbi36" => Ok(AssemblyId::Ncbi36),
            "other" => Ok(AssemblyId::Other),
            _ => Err(Error::InvalidInput(format!("unknown assembly id: {}", s))),
        }
    }
}

/// Outcome of comparing the allele indices of one genotype call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zygosity {
    Unknown,
    // Haploid
    Reference,
    Alternate,
    // Diploid or higher
    Heterozygous,
    HomozygousReference,
    HomozygousAlternate,
}

impl Zygosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zygosity::Unknown => "UNKNOWN",
            Zygosity::Reference => "REFERENCE",
            Zygosity::Alternate => "ALTERNATE",
            Zygosity::Heterozygous => "HETEROZYGOUS",
            Zygosity::HomozygousReference => "HOMOZYGOUS_REFERENCE",
            Zygosity::HomozygousAlternate => "HOMOZYGOUS_ALTERNATE",
        }
    }
}

/// Number of allele copies a genotype filter considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ploidy {
    Haploid,
    Diploid,
}

/// Genotype class a caller may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenotypeQuery {
    #[default]
    Uncalled,
    Reference,
    Alternate,
    HomozygousReference,
    Heterozygous,
    HomozygousAlternate,
}

impl GenotypeQuery {
    /// Zygosity a matching document must carry; `None` means no filter.
    pub fn zygosity(&self) -> Option<Zygosity> {
        match self {
            GenotypeQuery::Uncalled => None,
            GenotypeQuery::Reference => Some(Zygosity::Reference),
            GenotypeQuery::Alternate => Some(Zygosity::Alternate),
            GenotypeQuery::HomozygousReference => Some(Zygosity::HomozygousReference),
            GenotypeQuery::Heterozygous => Some(Zygosity::Heterozygous),
            GenotypeQuery::HomozygousAlternate => Some(Zygosity::HomozygousAlternate),
        }
    }

    /// Uncalled queries behave like diploid ones when matching alleles.
    pub fn ploidy(&self) -> Ploidy {
        match self {
            GenotypeQuery::Reference | GenotypeQuery::Alternate => Ploidy::Haploid,
            _ => Ploidy::Diploid,
        }
    }
}

impl FromStr for GenotypeQuery {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" => Ok(GenotypeQuery::Uncalled),
            "reference" => Ok(GenotypeQuery::Reference),
            "alternate" => Ok(GenotypeQuery::Alternate),
            "homozygous_reference" => Ok(GenotypeQuery::HomozygousReference),
            "heterozygous" => Ok(GenotypeQuery::Heterozygous),
            "homozygous_alternate" => Ok(GenotypeQuery::HomozygousAlternate),
            _ => Err(Error::InvalidInput(format!("unknown genotype: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    /// Anything other than an explicit descending token sorts ascending.
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Lifecycle of an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Queued,
    Downloading,
    Running,
    Done,
    Error,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Error)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub id: Uuid,
    pub filename: String,
    pub state: State,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionRequest {
    pub fn queued(filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            state: State::Queued,
            message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immediate answer for each filename handed to an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub filename: String,
    pub state: State,
    pub message: String,
}

impl IngestResponse {
    pub fn accepted(request: &IngestionRequest) -> Self {
        Self {
            id: Some(request.id),
            filename: request.filename.clone(),
            state: request.state,
            message: "Successfully queued..".to_string(),
        }
    }

    pub fn rejected(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            filename: filename.into(),
            state: State::Error,
            message: message.into(),
        }
    }
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub indexes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_id_parse_is_case_insensitive() {
        assert_eq!("grch38".parse::<AssemblyId>().unwrap(), AssemblyId::Grch38);
        assert_eq!("GRCh37".parse::<AssemblyId>().unwrap(), AssemblyId::Grch37);
        assert!("hg19".parse::<AssemblyId>().is_err());
    }

    #[test]
    fn test_assembly_id_serializes_to_build_name() {
        let json = serde_json::to_string(&AssemblyId::Grch38).unwrap();
        assert_eq!(json, "\"GRCh38\"");
    }

    #[test]
    fn test_genotype_query_ploidy() {
        assert_eq!(GenotypeQuery::Reference.ploidy(), Ploidy::Haploid);
        assert_eq!(GenotypeQuery::Alternate.ploidy(), Ploidy::Haploid);
        assert_eq!(GenotypeQuery::Heterozygous.ploidy(), Ploidy::Diploid);
        assert_eq!(GenotypeQuery::Uncalled.ploidy(), Ploidy::Diploid);
        assert_eq!(GenotypeQuery::Uncalled.zygosity(), None);
    }

    #[test]
    fn test_genotype_query_parse() {
        assert_eq!(
            "HOMOZYGOUS_ALTERNATE".parse::<GenotypeQuery>().unwrap(),
            GenotypeQuery::HomozygousAlternate
        );
        assert_eq!("".parse::<GenotypeQuery>().unwrap(), GenotypeQuery::Uncalled);
        assert!("triploid".parse::<GenotypeQuery>().is_err());
    }

    #[test]
    fn test_sort_direction_falls_back_to_ascending() {
        assert_eq!(SortDirection::parse_lenient("desc"), SortDirection::Descending);
        assert_eq!(SortDirection::parse_lenient("DESC"), SortDirection::Descending);
        assert_eq!(SortDirection::parse_lenient("asc"), SortDirection::Ascending);
        assert_eq!(SortDirection::parse_lenient("sideways"), SortDirection::Ascending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(State::Done.is_terminal());
        assert!(State::Error.is_terminal());
        assert!(!State::Queued.is_terminal());
        assert!(!State::Downloading.is_terminal());
        assert!(!State::Running.is_terminal());
    }
}
