//! Writing the model back into the template package.

mod sections;
mod workbook;
mod worksheet;

use std::collections::HashMap;
use std::io::{Seek, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::read::LoadedPackage;
use crate::recalc_policy::{remove_calc_chain_content_type, remove_calc_chain_relationship};
use crate::relationships::rels_for_part;
use crate::streaming::StreamedSheet;
use crate::styles::append_derived_styles;
use crate::{RecalcPolicy, XlsxError};

use sections::patch_sections;
use workbook::{WorkbookSections, WORKBOOK_ORDER};
use worksheet::{WorksheetSections, WORKSHEET_ORDER};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub(crate) fn write_package<W: Write + Seek>(
    package: &LoadedPackage,
    policy: RecalcPolicy,
    streamed: Vec<StreamedSheet>,
    out: W,
) -> Result<W, XlsxError> {
    let workbook = &package.workbook;

    let mut streamed_by_part: HashMap<&str, StreamedSheet> = HashMap::new();
    let mut streamed_formulas = false;
    for sheet in streamed {
        let part = package
            .sheet_parts
            .get(sheet.sheet_index())
            .filter(|_| sheet.sheet_index() < workbook.sheets.len())
            .ok_or(XlsxError::StreamedSheetMissing(sheet.sheet_index()))?;
        streamed_formulas |= sheet.has_formulas;
        streamed_by_part.insert(part.as_str(), sheet);
    }
    if let Some(sheet) = workbook.sheets.get(package.sheet_parts.len()) {
        return Err(XlsxError::SheetPartMissing(sheet.name.clone()));
    }

    let has_formulas = streamed_formulas || workbook.has_formulas();
    let mut calc = workbook.calc_settings.clone();
    if has_formulas && policy.force_full_calc_on_load {
        calc.full_calc_on_load = true;
    }
    let drop_calc_chain = has_formulas && policy.drop_calc_chain;
    let workbook_rels_part = rels_for_part(&package.workbook_part);
    let derived = workbook.styles.derived();
    if !derived.is_empty() && package.styles_part.is_none() {
        log::warn!(
            "{} derived styles dropped: the package has no styles part",
            derived.len()
        );
    }

    let mut zip = ZipWriter::new(out);
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in &package.parts {
        if drop_calc_chain && package.calc_chain_part.as_deref() == Some(name.as_str()) {
            log::debug!("dropping {name}");
            continue;
        }
        zip.start_file(name.as_str(), options)?;

        if let Some(idx) = package.sheet_parts.iter().position(|p| p == name) {
            if let Some(sheet) = workbook.sheets.get(idx) {
                let mut sections =
                    WorksheetSections::new(sheet, streamed_by_part.remove(name.as_str()));
                patch_sections(bytes, WORKSHEET_ORDER, &mut sections, &mut zip)?;
                continue;
            }
        }

        if *name == package.workbook_part {
            let mut sections = WorkbookSections {
                names: &workbook.defined_names,
                calc: &calc,
            };
            patch_sections(bytes, WORKBOOK_ORDER, &mut sections, &mut zip)?;
        } else if package.styles_part.as_deref() == Some(name.as_str()) {
            zip.write_all(&append_derived_styles(bytes, derived)?)?;
        } else if drop_calc_chain && *name == workbook_rels_part {
            zip.write_all(&remove_calc_chain_relationship(bytes)?)?;
        } else if drop_calc_chain && name == CONTENT_TYPES_PART {
            zip.write_all(&remove_calc_chain_content_type(bytes)?)?;
        } else {
            zip.write_all(bytes)?;
        }
    }

    Ok(zip.finish()?)
}
