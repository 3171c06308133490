// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! FHIR release strategies
//!
//! Each [`FhirRelease`] knows its resource-type catalogue, decodes resource
//! JSON into a [`TypedResource`] and builds the output [`ResponseEnvelope`].

use super::parameters::{Parameter, ParametersResource};
use crate::engine::{FhirPathValue, FhirResource, ModelProvider};
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Supported FHIR releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FhirRelease {
    R4,
    R4B,
    R5,
}

/// Why resource JSON could not be decoded for a release
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("failed to unmarshal resource JSON: {0}")]
    InvalidJson(String),

    #[error("resource JSON must be an object")]
    NotAnObject,

    #[error("resource JSON has no resourceType")]
    MissingResourceType,

    #[error("unknown resource type '{resource_type}' for {release}")]
    UnknownResourceType {
        resource_type: String,
        release: FhirRelease,
    },
}

impl FhirRelease {
    pub fn all() -> &'static [FhirRelease] {
        &[FhirRelease::R4, FhirRelease::R4B, FhirRelease::R5]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FhirRelease::R4 => "R4",
            FhirRelease::R4B => "R4B",
            FhirRelease::R5 => "R5",
        }
    }

    /// Full version of the release
    pub fn fhir_version(&self) -> &'static str {
        match self {
            FhirRelease::R4 => "4.0.1",
            FhirRelease::R4B => "4.3.0",
            FhirRelease::R5 => "5.0.0",
        }
    }

    /// `fhirVersion` MIME parameter value
    pub fn mime_version(&self) -> &'static str {
        match self {
            FhirRelease::R4 => "4.0",
            FhirRelease::R4B => "4.3",
            FhirRelease::R5 => "5.0",
        }
    }

    pub fn content_type(&self) -> String {
        format!("application/fhir+json; fhirVersion={}", self.mime_version())
    }

    pub fn is_resource_type(&self, name: &str) -> bool {
        self.resource_types().contains(name)
    }

    pub fn resource_types(&self) -> &'static FxHashSet<&'static str> {
        match self {
            FhirRelease::R4 => &*R4_TYPES,
            FhirRelease::R4B => &*R4B_TYPES,
            FhirRelease::R5 => &*R5_TYPES,
        }
    }

    /// Decodes a JSON object as a resource of this release.
    pub fn decode_resource(&self, json: &JsonValue) -> Result<TypedResource, DecodeError> {
        let object = json.as_object().ok_or(DecodeError::NotAnObject)?;
        let resource_type = object
            .get("resourceType")
            .and_then(JsonValue::as_str)
            .ok_or(DecodeError::MissingResourceType)?;
        if !self.is_resource_type(resource_type) {
            return Err(DecodeError::UnknownResourceType {
                resource_type: resource_type.to_string(),
                release: *self,
            });
        }
        Ok(TypedResource {
            release: *self,
            resource_type: resource_type.to_string(),
            json: Arc::new(json.clone()),
        })
    }

    /// Decodes resource JSON text, as carried by a `json-value` extension.
    pub fn decode_resource_str(&self, text: &str) -> Result<TypedResource, DecodeError> {
        let json: JsonValue =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        self.decode_resource(&json)
    }

    pub fn new_envelope(&self) -> ResponseEnvelope {
        ResponseEnvelope {
            release: *self,
            parameters: ParametersResource::new(),
        }
    }

    pub fn model(&self) -> ReleaseModel {
        ReleaseModel { release: *self }
    }
}

impl fmt::Display for FhirRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource decoded against a specific release
#[derive(Debug, Clone, PartialEq)]
pub struct TypedResource {
    pub release: FhirRelease,
    pub resource_type: String,
    pub json: Arc<JsonValue>,
}

impl TypedResource {
    pub fn to_value(&self) -> FhirPathValue {
        FhirPathValue::Resource(FhirResource::new(
            self.json.clone(),
            Some(self.resource_type.clone()),
        ))
    }

    pub fn json(&self) -> &JsonValue {
        &self.json
    }
}

/// Output `Parameters` tagged with the release that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub release: FhirRelease,
    pub parameters: ParametersResource,
}

impl ResponseEnvelope {
    pub fn push(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    pub fn content_type(&self) -> String {
        self.release.content_type()
    }
}

/// Release-specific [`ModelProvider`] for the evaluator
#[derive(Debug, Clone, Copy)]
pub struct ReleaseModel {
    release: FhirRelease,
}

impl ModelProvider for ReleaseModel {
    fn release_label(&self) -> &str {
        self.release.as_str()
    }

    fn is_resource_type(&self, name: &str) -> bool {
        self.release.is_resource_type(name)
    }

    fn element_type(&self, property: &str) -> Option<&'static str> {
        ELEMENT_TYPES.get(property).copied()
    }
}

/// Declared types of common elements, shared by every release
static ELEMENT_TYPES: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("name", "HumanName"),
        ("address", "Address"),
        ("telecom", "ContactPoint"),
        ("identifier", "Identifier"),
        ("period", "Period"),
        ("coding", "Coding"),
        ("code", "CodeableConcept"),
        ("category", "CodeableConcept"),
        ("maritalStatus", "CodeableConcept"),
        ("meta", "Meta"),
        ("text", "Narrative"),
        ("subject", "Reference"),
        ("patient", "Reference"),
        ("encounter", "Reference"),
        ("performer", "Reference"),
        ("managingOrganization", "Reference"),
        ("generalPractitioner", "Reference"),
        ("extension", "Extension"),
        ("modifierExtension", "Extension"),
        ("note", "Annotation"),
        ("birthDate", "date"),
        ("deceasedDateTime", "dateTime"),
        ("effectiveDateTime", "dateTime"),
        ("authoredOn", "dateTime"),
        ("recordedDate", "dateTime"),
        ("lastUpdated", "instant"),
        ("issued", "instant"),
    ]
    .into_iter()
    .collect()
});

const R4_RESOURCE_TYPES: &[&str] = &[
    "Account", "ActivityDefinition", "AdverseEvent", "AllergyIntolerance", "Appointment",
    "AppointmentResponse", "AuditEvent", "Basic", "Binary", "BiologicallyDerivedProduct",
    "BodyStructure", "Bundle", "CapabilityStatement", "CarePlan", "CareTeam", "CatalogEntry",
    "ChargeItem", "ChargeItemDefinition", "Claim", "ClaimResponse", "ClinicalImpression",
    "CodeSystem", "Communication", "CommunicationRequest", "CompartmentDefinition",
    "Composition", "ConceptMap", "Condition", "Consent", "Contract", "Coverage",
    "CoverageEligibilityRequest", "CoverageEligibilityResponse", "DetectedIssue", "Device",
    "DeviceDefinition", "DeviceMetric", "DeviceRequest", "DeviceUseStatement",
    "DiagnosticReport", "DocumentManifest", "DocumentReference", "EffectEvidenceSynthesis",
    "Encounter", "Endpoint", "EnrollmentRequest", "EnrollmentResponse", "EpisodeOfCare",
    "EventDefinition", "Evidence", "EvidenceVariable", "ExampleScenario",
    "ExplanationOfBenefit", "FamilyMemberHistory", "Flag", "Goal", "GraphDefinition", "Group",
    "GuidanceResponse", "HealthcareService", "ImagingStudy", "Immunization",
    "ImmunizationEvaluation", "ImmunizationRecommendation", "ImplementationGuide",
    "InsurancePlan", "Invoice", "Library", "Linkage", "List", "Location", "Measure",
    "MeasureReport", "Media", "Medication", "MedicationAdministration", "MedicationDispense",
    "MedicationKnowledge", "MedicationRequest", "MedicationStatement", "MedicinalProduct",
    "MedicinalProductAuthorization", "MedicinalProductContraindication",
    "MedicinalProductIndication", "MedicinalProductIngredient", "MedicinalProductInteraction",
    "MedicinalProductManufactured", "MedicinalProductPackaged",
    "MedicinalProductPharmaceutical", "MedicinalProductUndesirableEffect", "MessageDefinition",
    "MessageHeader", "MolecularSequence", "NamingSystem", "NutritionOrder", "Observation",
    "ObservationDefinition", "OperationDefinition", "OperationOutcome", "Organization",
    "OrganizationAffiliation", "Parameters", "Patient", "PaymentNotice",
    "PaymentReconciliation", "Person", "PlanDefinition", "Practitioner", "PractitionerRole",
    "Procedure", "Provenance", "Questionnaire", "QuestionnaireResponse", "RelatedPerson",
    "RequestGroup", "ResearchDefinition", "ResearchElementDefinition", "ResearchStudy",
    "ResearchSubject", "RiskAssessment", "RiskEvidenceSynthesis", "Schedule",
    "SearchParameter", "ServiceRequest", "Slot", "Specimen", "SpecimenDefinition",
    "StructureDefinition", "StructureMap", "Subscription", "Substance",
    "SubstanceNucleicAcid", "SubstancePolymer", "SubstanceProtein",
    "SubstanceReferenceInformation", "SubstanceSourceMaterial", "SubstanceSpecification",
    "SupplyDelivery", "SupplyRequest", "Task", "TerminologyCapabilities", "TestReport",
    "TestScript", "ValueSet", "VerificationResult", "VisionPrescription",
];

const R4B_REMOVED: &[&str] = &[
    "EffectEvidenceSynthesis", "MedicinalProduct", "MedicinalProductAuthorization",
    "MedicinalProductContraindication", "MedicinalProductIndication",
    "MedicinalProductIngredient", "MedicinalProductInteraction",
    "MedicinalProductManufactured", "MedicinalProductPackaged",
    "MedicinalProductPharmaceutical", "MedicinalProductUndesirableEffect",
    "RiskEvidenceSynthesis", "SubstanceSpecification",
];

const R4B_ADDED: &[&str] = &[
    "AdministrableProductDefinition", "Citation", "ClinicalUseDefinition", "EvidenceReport",
    "Ingredient", "ManufacturedItemDefinition", "MedicinalProductDefinition",
    "NutritionProduct", "PackagedProductDefinition", "RegulatedAuthorization",
    "SubscriptionStatus", "SubscriptionTopic", "SubstanceDefinition",
];

const R5_REMOVED: &[&str] = &[
    "CatalogEntry", "DeviceUseStatement", "DocumentManifest", "Media", "RequestGroup",
    "ResearchDefinition", "ResearchElementDefinition",
];

const R5_ADDED: &[&str] = &[
    "ActorDefinition", "ArtifactAssessment", "BiologicallyDerivedProductDispense",
    "ConditionDefinition", "DeviceDispense", "DeviceUsage", "EncounterHistory",
    "FormularyItem", "GenomicStudy", "ImagingSelection", "InventoryItem", "InventoryReport",
    "NutritionIntake", "Permission", "RequestOrchestration", "Requirements", "TestPlan",
    "Transport",
];

fn derive_types(
    base: &FxHashSet<&'static str>,
    removed: &[&'static str],
    added: &[&'static str],
) -> FxHashSet<&'static str> {
    base.iter()
        .copied()
        .filter(|name| !removed.contains(name))
        .chain(added.iter().copied())
        .collect()
}

static R4_TYPES: Lazy<FxHashSet<&'static str>> = Lazy::new(|| R4_RESOURCE_TYPES.iter().copied().collect());
static R4B_TYPES: Lazy<FxHashSet<&'static str>> = Lazy::new(|| derive_types(&R4_TYPES, R4B_REMOVED, R4B_ADDED));
static R5_TYPES: Lazy<FxHashSet<&'static str>> = Lazy::new(|| derive_types(&R4B_TYPES, R5_REMOVED, R5_ADDED));

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalogues_differ_per_release() {
        assert!(FhirRelease::R4.is_resource_type("Media"));
        assert!(!FhirRelease::R5.is_resource_type("Media"));
        assert!(!FhirRelease::R4.is_resource_type("Citation"));
        assert!(FhirRelease::R4B.is_resource_type("Citation"));
        assert!(FhirRelease::R5.is_resource_type("Citation"));
        assert!(FhirRelease::R5.is_resource_type("Permission"));
        for release in FhirRelease::all() {
            assert!(release.is_resource_type("Patient"));
        }
    }

    #[test]
    fn decode_checks_resource_type() {
        let patient = FhirRelease::R4
            .decode_resource(&json!({"resourceType": "Patient", "id": "p1"}))
            .unwrap();
        assert_eq!(patient.resource_type, "Patient");
        assert_eq!(patient.release, FhirRelease::R4);

        assert_eq!(
            FhirRelease::R4.decode_resource(&json!({"id": "x"})),
            Err(DecodeError::MissingResourceType)
        );
        assert_eq!(FhirRelease::R4.decode_resource(&json!([1])), Err(DecodeError::NotAnObject));
        assert!(matches!(
            FhirRelease::R5.decode_resource(&json!({"resourceType": "Media"})),
            Err(DecodeError::UnknownResourceType { .. })
        ));
    }

    #[test]
    fn decode_from_text_reports_json_errors() {
        let err = FhirRelease::R4B.decode_resource_str("{not json").unwrap_err();
        assert!(err.to_string().starts_with("failed to unmarshal resource JSON"));
    }

    #[test]
    fn envelope_content_type() {
        assert_eq!(
            FhirRelease::R4B.new_envelope().content_type(),
            "application/fhir+json; fhirVersion=4.3"
        );
    }
}
