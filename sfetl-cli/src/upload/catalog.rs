//! Static description of the 28 objects the uploader knows about
//!
//! Each [`ObjectSpec`] declares how its snapshot rows are shaped into
//! Salesforce payloads and which other objects its reference fields point
//! at. The dependency graph and the field mapper are both driven from here.

/// External-id field carrying the snapshot record ID
pub const EXTERNAL_ID_FIELD: &str = "OriginalId__c";

/// Columns never sent, on any object
pub const SYSTEM_FIELDS: &[&str] = &[
    "CreatedDate",
    "CreatedById",
    "LastModifiedDate",
    "LastModifiedById",
    "SystemModstamp",
    "LastActivityDate",
    "LastViewedDate",
    "LastReferencedDate",
    "IsDeleted",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Upsert keyed by `OriginalId__c`
    Upsert,
    /// Plain insert; already-mapped rows are skipped
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Object(&'static str),
    /// WhatId / WhoId style field pointing at one of several objects
    Polymorphic(&'static [&'static str]),
}

impl RefTarget {
    pub fn candidates(&self) -> &[&'static str] {
        match self {
            RefTarget::Object(target) => std::slice::from_ref(target),
            RefTarget::Polymorphic(targets) => targets,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefField {
    pub field: &'static str,
    pub target: RefTarget,
    /// Rows whose value cannot be resolved are skipped instead of sent without it
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixedValue {
    Text(&'static str),
    Bool(bool),
}

impl FixedValue {
    pub fn to_json(self) -> serde_json::Value {
        match self {
            FixedValue::Text(s) => serde_json::Value::String(s.to_string()),
            FixedValue::Bool(b) => serde_json::Value::Bool(b),
        }
    }
}

/// Per-object derived fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Computed {
    /// `UnitPrice = TotalPrice / Quantity`, `TotalPrice` removed
    UnitPriceFromTotal,
    /// `Name` from the phone number or the source ID
    AccountName,
    /// Username / LastName / Alias / ProfileId, e-mail validation
    UserIdentity,
    /// `DeveloperName` from `Name`, unique within the run
    TerritoryDeveloperName,
    /// `UrlName` unique against the org and the run
    UniqueUrlName,
}

#[derive(Debug, Clone)]
pub struct ObjectSpec {
    pub name: &'static str,
    pub mode: UploadMode,
    /// Snapshot table; `None` for objects only created by preparation steps
    pub source_table: Option<&'static str>,
    pub references: &'static [RefField],
    pub dropped: &'static [&'static str],
    pub renamed: &'static [(&'static str, &'static str)],
    /// Set when absent from the row
    pub defaults: &'static [(&'static str, FixedValue)],
    /// Always set, overriding the row
    pub forced: &'static [(&'static str, FixedValue)],
    pub computed: &'static [Computed],
    /// Does Salesforce accept `OriginalId__c` on this object
    pub external_id: bool,
}

impl ObjectSpec {
    pub fn reference(&self, field: &str) -> Option<&RefField> {
        self.references.iter().find(|r| r.field == field)
    }

    /// Objects this one must be uploaded after (self-references excluded)
    pub fn parents(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.references
            .iter()
            .flat_map(|r| r.target.candidates().iter().copied())
            .filter(move |t| *t != self.name)
    }
}

const fn reference(field: &'static str, target: &'static str) -> RefField {
    RefField {
        field,
        target: RefTarget::Object(target),
        required: false,
    }
}

const fn required(field: &'static str, target: &'static str) -> RefField {
    RefField {
        field,
        target: RefTarget::Object(target),
        required: true,
    }
}

const fn polymorphic(field: &'static str, targets: &'static [&'static str]) -> RefField {
    RefField {
        field,
        target: RefTarget::Polymorphic(targets),
        required: false,
    }
}

const fn spec(name: &'static str) -> ObjectSpec {
    ObjectSpec {
        name,
        mode: UploadMode::Upsert,
        source_table: Some(name),
        references: &[],
        dropped: &[],
        renamed: &[],
        defaults: &[],
        forced: &[],
        computed: &[],
        external_id: true,
    }
}

const OWNER: RefField = reference("OwnerId", "User");
const WHAT_TARGETS: &[&str] = &["Account", "Opportunity", "Case", "Contract"];
const WHO_TARGETS: &[&str] = &["Contact", "Lead"];

/// Upload order of the original toolkit, which the graph reproduces
pub static CATALOG: &[ObjectSpec] = &[
    ObjectSpec {
        mode: UploadMode::Insert,
        references: &[reference("ManagerId", "User")],
        dropped: &["ProfileId", "UserRoleId", "ContactId", "AccountId"],
        defaults: &[
            ("TimeZoneSidKey", FixedValue::Text("America/New_York")),
            ("LocaleSidKey", FixedValue::Text("en_US")),
            ("EmailEncodingKey", FixedValue::Text("UTF-8")),
            ("LanguageLocaleKey", FixedValue::Text("en_US")),
        ],
        computed: &[Computed::UserIdentity],
        external_id: false,
        ..spec("User")
    },
    ObjectSpec {
        references: &[OWNER, reference("ParentId", "Account")],
        dropped: &[
            "RecordTypeId",
            "FirstName",
            "LastName",
            "PersonEmail",
            "PersonContactId",
            "IsPersonAccount",
            "ShippingState",
            "ShippingCity",
        ],
        computed: &[Computed::AccountName],
        ..spec("Account")
    },
    ObjectSpec {
        references: &[OWNER],
        dropped: &[
            "IsConverted",
            "ConvertedDate",
            "ConvertedAccountId",
            "ConvertedContactId",
            "ConvertedOpportunityId",
        ],
        ..spec("Lead")
    },
    ObjectSpec {
        references: &[reference("ParentTerritory2Id", "Territory2")],
        dropped: &["Territory2ModelId", "Territory2TypeId"],
        computed: &[Computed::TerritoryDeveloperName],
        ..spec("Territory2")
    },
    ObjectSpec {
        references: &[required("UserId", "User"), required("Territory2Id", "Territory2")],
        ..spec("UserTerritory2Association")
    },
    ObjectSpec {
        references: &[reference("ParentCategoryId", "ProductCategory")],
        dropped: &["CatalogId"],
        ..spec("ProductCategory")
    },
    spec("Product2"),
    ObjectSpec {
        dropped: &["IsStandard", "ValidFrom", "ValidTo"],
        ..spec("Pricebook2")
    },
    ObjectSpec {
        references: &[
            required("Pricebook2Id", "Pricebook2"),
            required("Product2Id", "Product2"),
        ],
        defaults: &[("IsActive", FixedValue::Bool(true))],
        ..spec("PricebookEntry")
    },
    ObjectSpec {
        references: &[
            reference("AccountId", "Account"),
            OWNER,
            reference("ReportsToId", "Contact"),
        ],
        ..spec("Contact")
    },
    ObjectSpec {
        references: &[
            reference("AccountId", "Account"),
            reference("ContactId", "Contact"),
            reference("Pricebook2Id", "Pricebook2"),
            OWNER,
        ],
        dropped: &["ContractID__c"],
        ..spec("Opportunity")
    },
    ObjectSpec {
        references: &[
            required("OpportunityId", "Opportunity"),
            reference("PricebookEntryId", "PricebookEntry"),
            reference("Product2Id", "Product2"),
        ],
        computed: &[Computed::UnitPriceFromTotal],
        ..spec("OpportunityLineItem")
    },
    ObjectSpec {
        references: &[required("AccountId", "Account"), OWNER],
        dropped: &["ActivatedDate", "ActivatedById", "CompanySignedId", "CustomerSignedId"],
        forced: &[("Status", FixedValue::Text("Draft"))],
        ..spec("Contract")
    },
    ObjectSpec {
        references: &[
            required("OpportunityId", "Opportunity"),
            reference("ContactId", "Contact"),
            reference("Pricebook2Id", "Pricebook2"),
            OWNER,
        ],
        dropped: &["AccountId"],
        ..spec("Quote")
    },
    ObjectSpec {
        references: &[
            required("QuoteId", "Quote"),
            required("PricebookEntryId", "PricebookEntry"),
            reference("Product2Id", "Product2"),
        ],
        computed: &[Computed::UnitPriceFromTotal],
        ..spec("QuoteLineItem")
    },
    ObjectSpec {
        references: &[OWNER],
        ..spec("Issue__c")
    },
    ObjectSpec {
        references: &[
            required("AccountId", "Account"),
            reference("Pricebook2Id", "Pricebook2"),
            reference("ContractId", "Contract"),
            OWNER,
        ],
        dropped: &["ActivatedDate", "ActivatedById"],
        forced: &[("Status", FixedValue::Text("Draft"))],
        ..spec("Order")
    },
    ObjectSpec {
        references: &[
            required("OrderId", "Order"),
            required("PricebookEntryId", "PricebookEntry"),
            reference("Product2Id", "Product2"),
        ],
        renamed: &[("PriceBookEntryId", "PricebookEntryId")],
        ..spec("OrderItem")
    },
    ObjectSpec {
        references: &[
            reference("AccountId", "Account"),
            reference("ContactId", "Contact"),
            OWNER,
            reference("IssueId__c", "Issue__c"),
            reference("OrderItemId__c", "OrderItem"),
        ],
        dropped: &["ClosedDate"],
        ..spec("Case")
    },
    ObjectSpec {
        mode: UploadMode::Insert,
        references: &[
            polymorphic("WhatId", WHAT_TARGETS),
            polymorphic("WhoId", WHO_TARGETS),
            OWNER,
        ],
        external_id: false,
        ..spec("Task")
    },
    ObjectSpec {
        mode: UploadMode::Insert,
        references: &[
            polymorphic("WhatId", WHAT_TARGETS),
            polymorphic("WhoId", WHO_TARGETS),
            OWNER,
        ],
        external_id: false,
        ..spec("Event")
    },
    ObjectSpec {
        references: &[
            required("ProductCategoryId", "ProductCategory"),
            required("ProductId", "Product2"),
        ],
        ..spec("ProductCategoryProduct")
    },
    ObjectSpec {
        references: &[reference("ParentId", "Case")],
        dropped: &["ToIds", "RelatedToId", "ActivityId"],
        ..spec("EmailMessage")
    },
    ObjectSpec {
        mode: UploadMode::Insert,
        source_table: None,
        ..spec("LiveChatVisitor")
    },
    ObjectSpec {
        references: &[
            required("LiveChatVisitorId", "LiveChatVisitor"),
            reference("AccountId", "Account"),
            reference("CaseId", "Case"),
            reference("ContactId", "Contact"),
            reference("LeadId", "Lead"),
            OWNER,
        ],
        ..spec("LiveChatTranscript")
    },
    ObjectSpec {
        references: &[
            reference("CaseId__c", "Case"),
            reference("ContactId__c", "Contact"),
            reference("LeadId__c", "Lead"),
            reference("AccountId__c", "Account"),
            reference("OpportunityId__c", "Opportunity"),
            OWNER,
        ],
        ..spec("VoiceCallTranscript__c")
    },
    ObjectSpec {
        references: &[reference("CaseId__c", "Case"), OWNER],
        ..spec("CaseHistory__c")
    },
    ObjectSpec {
        mode: UploadMode::Insert,
        dropped: &["KnowledgeArticleId", "PublishStatus", "VersionNumber", "ArticleNumber"],
        defaults: &[
            ("Language", FixedValue::Text("en_US")),
            ("ValidationStatus", FixedValue::Text("Draft")),
        ],
        computed: &[Computed::UniqueUrlName],
        external_id: false,
        ..spec("Knowledge__kav")
    },
];

/// Look up a catalog entry by object name
pub fn find(name: &str) -> Option<&'static ObjectSpec> {
    CATALOG.iter().find(|s| s.name == name)
}

/// Catalog position, used to break ordering ties
pub fn position(name: &str) -> Option<usize> {
    CATALOG.iter().position(|s| s.name == name)
}

/// Resolve user-supplied object names, rejecting unknown ones
pub fn select(names: &[String]) -> anyhow::Result<Vec<&'static ObjectSpec>> {
    names
        .iter()
        .map(|name| {
            find(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown object '{}'. Known objects: {}",
                    name,
                    CATALOG.iter().map(|s| s.name).collect::<Vec<_>>().join(", ")
                )
            })
        })
        .collect()
}

/// Apply `--only` / `--skip` to the catalog; the result is in catalog order
pub fn filter(only: &[String], skip: &[String]) -> anyhow::Result<Vec<&'static ObjectSpec>> {
    let selected = if only.is_empty() {
        CATALOG.iter().collect()
    } else {
        select(only)?
    };
    let skipped = select(skip)?;

    let mut result: Vec<&'static ObjectSpec> = selected
        .into_iter()
        .filter(|s| !skipped.iter().any(|k| k.name == s.name))
        .collect();
    result.sort_by_key(|s| position(s.name));
    result.dedup_by_key(|s| s.name);
    Ok(result)
}
