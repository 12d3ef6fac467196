use std::collections::HashSet;

use crate::error::SchemaError;
use crate::param::{ParamKind, ParamValue, Parameter};

/// An ordered, immutable set of [`Parameter`] descriptors.
///
/// Created once at startup from the XML parameter file (see
/// [`loader::load_file`]) and shared (by reference or `Arc`) for the
/// lifetime of the run; nothing mutates a schema after construction.
#[derive(Debug, Clone)]
pub struct ParameterSchema {
    params: Vec<Parameter>,
}

impl ParameterSchema {
    /// Build and validate a schema from an already-parsed parameter list.
    ///
    /// Checks the schema invariants: `max >= min`, `step <= max - min`
    /// where applicable, and dense unique indices starting at 0.
    pub fn new(mut params: Vec<Parameter>) -> Result<Self, SchemaError> {
        if params.is_empty() {
            return Err(SchemaError::Empty);
        }
        params.sort_by_key(|p| p.index);

        let mut seen = HashSet::new();
        for (expected, p) in params.iter().enumerate() {
            if !seen.insert(p.index) {
                return Err(SchemaError::DuplicateIndex(p.index));
            }
            if p.index != expected as u32 {
                return Err(SchemaError::NonDenseIndex {
                    expected: expected as u32,
                    found: p.index,
                });
            }
            if matches!(p.kind, ParamKind::Real | ParamKind::Integer) {
                if p.max < p.min {
                    return Err(SchemaError::MaxBelowMin {
                        index: p.index,
                        min: p.min,
                        max: p.max,
                    });
                }
                let range = p.max - p.min;
                if p.step > 0.0 && p.step > range && range > 0.0 {
                    return Err(SchemaError::StepExceedsRange {
                        index: p.index,
                        step: p.step,
                        range,
                    });
                }
            }
        }

        Ok(Self { params })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Indices of parameters the search is allowed to mutate, in index
    /// order. Most call sites iterate this rather than all parameters.
    pub fn mutable_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.mutable())
            .map(|(i, _)| i)
    }

    /// Initial values for every parameter, in index order.
    pub fn initial_values(&self) -> Vec<ParamValue> {
        self.params.iter().map(|p| p.initial.clone()).collect()
    }

    /// `1 + max over mutable parameters of ((max - min) / step)`, the
    /// column count of the `ProbabilityMatrix`.
    pub fn max_grid_columns(&self) -> u32 {
        self.mutable_indices()
            .map(|i| self.params[i].grid_columns())
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

pub mod loader {
    //! XML parameter-schema loader.
    //!
    //! The format is a tagged tree: a root holding any number of namelist
    //! groups, each holding `<param>` entries. A group carrying
    //! `display="False"` suppresses every parameter inside it regardless of
    //! that parameter's own `<display>` tag.

    use std::path::Path;

    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    use super::ParameterSchema;
    use crate::error::SchemaError;
    use crate::param::{ParamKind, ParamValue, Parameter};

    pub fn load_file(path: &Path) -> Result<ParameterSchema, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        load_str(&text)
    }

    pub fn load_str(xml: &str) -> Result<ParameterSchema, SchemaError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut params = Vec::new();
        let mut group_display = vec![true];
        let mut in_param = false;
        let mut cur = RawParam::default();
        let mut field: Option<&'static str> = None;

        loop {
            match reader.read_event().map_err(SchemaError::Xml)? {
                Event::Start(e) | Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if name.eq_ignore_ascii_case("param") {
                        in_param = true;
                        cur = RawParam::default();
                        for attr in e.attributes().flatten() {
                            let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
                            let val = attr.unescape_value().unwrap_or_default().to_string();
                            if key == "x" {
                                cur.x = Some(val);
                            } else if key == "y" {
                                cur.y = Some(val);
                            }
                        }
                    } else if in_param {
                        field = field_for(&name);
                    } else {
                        let display = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref().eq_ignore_ascii_case(b"display"))
                            .map(|a| {
                                !a.unescape_value()
                                    .unwrap_or_default()
                                    .eq_ignore_ascii_case("false")
                            })
                            .unwrap_or(true);
                        group_display.push(display && *group_display.last().unwrap());
                    }
                }
                Event::Text(t) => {
                    if let Some(f) = field {
                        let text = t.unescape().unwrap_or_default().to_string();
                        cur.set(f, text);
                    }
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if name.eq_ignore_ascii_case("param") {
                        in_param = false;
                        field = None;
                        let group_visible = *group_display.last().unwrap_or(&true);
                        params.push(cur.finish(group_visible)?);
                    } else if !in_param {
                        if group_display.len() > 1 {
                            group_display.pop();
                        }
                    } else {
                        field = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        ParameterSchema::new(params)
    }

    fn field_for(tag: &str) -> Option<&'static str> {
        match tag.to_ascii_lowercase().as_str() {
            "index" => Some("index"),
            "name" => Some("name"),
            "type" => Some("type"),
            "value" => Some("value"),
            "min_value" => Some("min"),
            "max_value" => Some("max"),
            "gap" => Some("step"),
            "display" => Some("display"),
            "fixed" => Some("fixed"),
            _ => None,
        }
    }

    #[derive(Default)]
    struct RawParam {
        index: Option<String>,
        name: Option<String>,
        type_: Option<String>,
        value: Option<String>,
        min: Option<String>,
        max: Option<String>,
        step: Option<String>,
        display: Option<String>,
        fixed: Option<String>,
        x: Option<String>,
        y: Option<String>,
    }

    impl RawParam {
        fn set(&mut self, field: &str, text: String) {
            let slot = match field {
                "index" => &mut self.index,
                "name" => &mut self.name,
                "type" => &mut self.type_,
                "value" => &mut self.value,
                "min" => &mut self.min,
                "max" => &mut self.max,
                "step" => &mut self.step,
                "display" => &mut self.display,
                "fixed" => &mut self.fixed,
                _ => return,
            };
            *slot = Some(text);
        }

        fn finish(self, group_visible: bool) -> Result<Parameter, SchemaError> {
            let index: u32 = self
                .index
                .as_deref()
                .ok_or(SchemaError::MissingAttr {
                    index: 0,
                    attr: "index",
                })?
                .trim()
                .parse()
                .unwrap_or(0);
            let mut name = self.name.unwrap_or_else(|| format!("param{index}"));
            if let (Some(x), Some(y)) = (&self.x, &self.y) {
                name = format!("{name}[{x},{y}]");
            }
            let type_str = self.type_.unwrap_or_else(|| "double".to_string());
            let kind = match type_str.to_ascii_lowercase().as_str() {
                "double" | "float" | "real" => ParamKind::Real,
                "int" | "integer" => ParamKind::Integer,
                "bool" | "boolean" => ParamKind::Boolean,
                "string" | "str" => ParamKind::String,
                other => return Err(SchemaError::UnknownType(other.to_string())),
            };

            let parse_f64 = |s: &Option<String>, default: f64| -> f64 {
                s.as_deref().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
            };
            let min = parse_f64(&self.min, 0.0);
            let max = parse_f64(&self.max, 0.0);
            let step = parse_f64(&self.step, 0.0);

            let display = group_visible
                && self
                    .display
                    .as_deref()
                    .map(|s| !s.trim().eq_ignore_ascii_case("false"))
                    .unwrap_or(true);
            let fixed = self
                .fixed
                .as_deref()
                .map(|s| s.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false);

            let raw_value = self.value.unwrap_or_default();
            let initial = match kind {
                ParamKind::Real => ParamValue::Real(raw_value.trim().parse().unwrap_or(min)),
                ParamKind::Integer => {
                    ParamValue::Integer(raw_value.trim().parse().unwrap_or(min as i64))
                }
                ParamKind::Boolean => {
                    ParamValue::Boolean(raw_value.trim().eq_ignore_ascii_case("true"))
                }
                ParamKind::String => ParamValue::String(raw_value),
            };

            Ok(Parameter {
                index,
                name,
                kind,
                min,
                max,
                step,
                fixed,
                display,
                initial,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const SAMPLE: &str = r#"
        <root>
          <namelist name="shape">
            <param>
              <index>0</index>
              <name>x0</name>
              <type>double</type>
              <value>0.0</value>
              <min_value>-5</min_value>
              <max_value>5</max_value>
              <gap>0.01</gap>
              <display>True</display>
              <fixed>False</fixed>
            </param>
            <param>
              <index>1</index>
              <name>flag</name>
              <type>bool</type>
              <value>false</value>
              <display>True</display>
            </param>
          </namelist>
          <namelist name="hidden" display="False">
            <param>
              <index>2</index>
              <name>secret</name>
              <type>int</type>
              <value>3</value>
              <min_value>0</min_value>
              <max_value>10</max_value>
              <gap>1</gap>
              <display>True</display>
            </param>
          </namelist>
        </root>
        "#;

        #[test]
        fn parses_params_and_group_display() {
            let schema = load_str(SAMPLE).expect("valid schema");
            assert_eq!(schema.len(), 3);
            assert!(schema.get(0).unwrap().mutable());
            assert!(schema.get(1).unwrap().mutable());
            assert!(!schema.get(2).unwrap().mutable(), "hidden group suppresses display");
        }

        #[test]
        fn rejects_empty_schema() {
            assert!(matches!(load_str("<root></root>"), Err(SchemaError::Empty)));
        }
    }
}
