//! Shared YAML documents for unit tests

use crate::document::DhfDocument;

/// Grouped document in the current layout, 3-level product requirements
pub const SAMPLE_DHF_YAML: &str = r#"metadata:
  project_name: Test Diabetes Monitor
  device_type: Continuous Glucose Monitor
  version: 1.0.0
  created_date: '2025-01-01'
user_needs:
  Athlete Performance:
    group_name: Athlete Performance
    needs:
      UN001:
        title: Accurate Glucose Monitoring
        description: The device must accurately measure blood glucose levels
      UN002:
        title: Real-time Alerts
        description: The device must provide real-time alerts for dangerous glucose levels
risks:
  Patient Safety:
    group_name: Patient Safety
    risks:
      R001:
        title: Inaccurate Glucose Reading
        harm: Incorrect treatment decisions
        sequence_of_events: Sensor malfunction leads to false reading
        hazardous_situation: Patient receives incorrect insulin dose
        probability_occurrence: PO2
        probability_harm: PH3
        severity: S3
        cannot_be_reduced_further: false
        benefits_outweigh_risk: true
        justification: Risk is acceptable with proper calibration
      R002:
        title: Delayed Alert
        probability_occurrence: PO1
        probability_harm: PH2
        severity: S2
product_requirements:
  functional_requirements:
    group_name: Functional Requirements
    description: Core functionality that the system must provide
    requirements:
      muscle_contraction_measurement:
        group_name: Muscle Contraction Measurement
        description: Requirements for measuring muscle contraction percentages
        requirements:
          PR001:
            title: Glucose Measurement Accuracy
            description: The device must measure glucose with 15% accuracy
            linked_user_needs:
            - UN001
  performance_requirements:
    group_name: Performance Requirements
    requirements:
      PR002:
        title: Alert Latency
        description: Alerts must fire within 5 seconds
        linked_user_needs:
        - UN002
        - UN404
software_specifications:
  Measurement:
    group_name: Measurement
    specifications:
      SS001:
        title: Glucose Algorithm
        description: Algorithm for converting sensor data to glucose readings
        linked_product_requirements:
        - PR001
hardware_specifications:
  Sensor:
    group_name: Sensor
    specifications:
      HS001:
        title: Glucose Sensor
        description: Electrochemical sensor for glucose detection
        linked_product_requirements:
        - PR001
        - PR002
mitigation_links:
  ML001:
    specification_id: SS001
    specification_type: software
    risk_id: R001
    effect: Reduces probability of occurrence by 1
  ML002:
    specification_id: HS001
    risk_id: R002
    effect: Untyped link
  ML003:
    specification_id: HS001
    specification_type: hardware
    risk_id: R002
    effect: Reduces severity
configuration:
  severity_mapping:
    S1:
      name: Low
      description: Minor impact
    S2:
      name: Medium
      description: Moderate impact
    S3:
      name: High
      description: Significant impact
  probability_occurrence_mapping:
    PO1:
      name: Low
      description: Unlikely to occur
    PO2:
      name: Medium
      description: May occur occasionally
  probability_harm_mapping:
    PH1:
      name: Low
      description: Unlikely to cause harm
    PH3:
      name: High
      description: Likely to cause harm
"#;

/// Every storage shape side by side, plus one malformed entry
pub const MIXED_SHAPES_YAML: &str = r#"user_needs:
  UN900:
    title: Legacy Need
    description: Stored flat
  grouped:
    group_name: Grouped Needs
    needs:
      UN001:
        title: Nested Need
risks:
  R900:
    title: Legacy Risk
    severity: S2
  safety:
    group_name: Safety
    risks:
      R001:
        title: Nested Risk
        severity: S1
product_requirements:
  PR900:
    title: Legacy Requirement
    linked_user_needs:
    - UN900
  two_level:
    group_name: Two Level
    requirements:
      PR100:
        title: Two Level A
        linked_user_needs:
        - UN001
      PR101:
        title: Two Level B
  three_level:
    group_name: Three Level
    requirements:
      sub_a:
        group_name: Sub A
        requirements:
          PR200:
            title: Three Level A
            linked_user_needs:
            - UN001
            - UN900
      sub_b:
        requirements:
          PR201:
            title: Three Level B
  broken: just a string
software_specifications:
  sw:
    specifications:
      SS100:
        title: Software Spec
        linked_product_requirements:
        - PR200
hardware_specifications: {}
custom_section:
  owner: QA
"#;

pub fn parse(yaml: &str) -> DhfDocument {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
    DhfDocument::from_value(value).unwrap()
}
