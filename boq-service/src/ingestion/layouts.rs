//! Vendor workbook templates, kept as data.

use super::extractor::{FieldKind, FieldRule, RowRules};
use super::header::{Column, ColumnSpec, HeaderStrategy};
use crate::models::Vendor;

/// Contract for one logical sheet.
#[derive(Debug, Clone, Copy)]
pub struct SheetContract {
    pub logical_name: &'static str,
    pub header: HeaderStrategy,
    pub columns: &'static [ColumnSpec],
    pub rules: RowRules,
}

#[derive(Debug, Clone, Copy)]
pub struct VendorLayout {
    pub vendor: Vendor,
    /// Sheets that must all be present before anything is read.
    pub required_sheets: &'static [&'static str],
    /// Sheets that contribute line items, in output order.
    pub line_sheets: &'static [SheetContract],
    pub rate_card: SheetContract,
}

impl VendorLayout {
    pub fn for_vendor(vendor: Vendor) -> &'static VendorLayout {
        match vendor {
            Vendor::ServicePo => &SERVICE_PO,
            Vendor::MaterialBoq => &MATERIAL_BOQ,
            Vendor::WorkOrder => &WORK_ORDER,
        }
    }
}

const ADDITIONAL_WORK: &str = "Additional Work";

// Price is listed before unit of measure so "Unit Price" is claimed first.
const fn price(keyword_sets: &'static [&'static [&'static str]], required: bool) -> ColumnSpec {
    ColumnSpec {
        column: Column::UnitPrice,
        keyword_sets,
        required,
    }
}

const DESCRIPTION: ColumnSpec = ColumnSpec {
    column: Column::Description,
    keyword_sets: &[&["description"], &["desc"]],
    required: true,
};

const QUANTITY: ColumnSpec = ColumnSpec {
    column: Column::Quantity,
    keyword_sets: &[&["quantity"], &["qty"]],
    required: true,
};

const UNIT_OF_MEASURE: ColumnSpec = ColumnSpec {
    column: Column::UnitOfMeasure,
    keyword_sets: &[&["uom"], &["unit", "measure"], &["unit"]],
    required: false,
};

const LINE_RULES: RowRules = RowRules {
    fields: &[
        FieldRule {
            column: Column::ItemCode,
            kind: FieldKind::Text,
            required: true,
        },
        FieldRule {
            column: Column::Description,
            kind: FieldKind::Text,
            required: false,
        },
        FieldRule {
            column: Column::UnitOfMeasure,
            kind: FieldKind::Text,
            required: false,
        },
        FieldRule {
            column: Column::Quantity,
            kind: FieldKind::Positive,
            required: true,
        },
        FieldRule {
            column: Column::UnitPrice,
            kind: FieldKind::NonNegative,
            required: false,
        },
    ],
    additional_work_marker: Some(ADDITIONAL_WORK),
};

const RATE_CARD: SheetContract = SheetContract {
    logical_name: "Rate Card",
    header: HeaderStrategy::Scan { marker: "code" },
    columns: &[
        ColumnSpec {
            column: Column::ItemCode,
            keyword_sets: &[&["code"]],
            required: true,
        },
        price(&[&["rate"], &["price"], &["amount"], &["cost"]], true),
        ColumnSpec {
            required: false,
            ..DESCRIPTION
        },
    ],
    rules: RowRules {
        fields: &[
            FieldRule {
                column: Column::ItemCode,
                kind: FieldKind::Text,
                required: true,
            },
            FieldRule {
                column: Column::Description,
                kind: FieldKind::Text,
                required: false,
            },
            FieldRule {
                column: Column::UnitPrice,
                kind: FieldKind::NonNegative,
                required: true,
            },
        ],
        additional_work_marker: None,
    },
};

static SERVICE_PO: VendorLayout = VendorLayout {
    vendor: Vendor::ServicePo,
    required_sheets: &["PO"],
    line_sheets: &[SheetContract {
        logical_name: "PO",
        header: HeaderStrategy::Scan {
            marker: "service number",
        },
        columns: &[
            ColumnSpec {
                column: Column::ItemCode,
                keyword_sets: &[&["service", "number"], &["service", "no"], &["code"]],
                required: true,
            },
            price(
                &[&["unit", "price"], &["rate"], &["price"], &["amount"], &["cost"]],
                false,
            ),
            DESCRIPTION,
            QUANTITY,
            UNIT_OF_MEASURE,
        ],
        rules: LINE_RULES,
    }],
    rate_card: RATE_CARD,
};

const BOQ_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        column: Column::ItemCode,
        keyword_sets: &[&["item", "code"], &["item", "no"], &["code"]],
        required: true,
    },
    price(
        &[&["rate"], &["unit", "price"], &["price"], &["amount"], &["cost"]],
        false,
    ),
    DESCRIPTION,
    QUANTITY,
    UNIT_OF_MEASURE,
];

const fn boq_sheet(logical_name: &'static str) -> SheetContract {
    SheetContract {
        logical_name,
        header: HeaderStrategy::Fixed { row: 13 },
        columns: BOQ_COLUMNS,
        rules: LINE_RULES,
    }
}

static MATERIAL_BOQ: VendorLayout = VendorLayout {
    vendor: Vendor::MaterialBoq,
    required_sheets: &["Main", "BOQ", "Remove", "Surplus"],
    line_sheets: &[boq_sheet("BOQ"), boq_sheet("Remove"), boq_sheet("Surplus")],
    rate_card: RATE_CARD,
};

static WORK_ORDER: VendorLayout = VendorLayout {
    vendor: Vendor::WorkOrder,
    required_sheets: &["Work Order"],
    line_sheets: &[SheetContract {
        logical_name: "Work Order",
        header: HeaderStrategy::Scan { marker: "item code" },
        columns: BOQ_COLUMNS,
        rules: LINE_RULES,
    }],
    rate_card: RATE_CARD,
};
